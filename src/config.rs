use crate::follower::{FollowOptions, MissingPolicy, PartialLinePolicy, TruncationPolicy};
use crate::output::OutputFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "logtail.toml";

/// Top-level configuration loaded from logtail.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TailConfig {
    pub follow: FollowConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    /// Trailing lines shown before following (0 = skip).
    pub lines: usize,
    pub sleep_interval_secs: f64,
    pub partial_lines: PartialLinePolicy,
    pub on_truncate: TruncationPolicy,
    pub on_missing: MissingPolicy,
    /// Events buffered between the follower thread and the printer.
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Only print lines matching this regex.
    pub grep: Option<String>,
    pub case_sensitive: bool,
    /// Treat `grep` as a literal substring instead of a regex.
    pub fixed_strings: bool,
    /// Print `==> ... <==` status lines on stderr.
    pub banners: bool,
}

// --- Default implementations ---

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            lines: 10,
            sleep_interval_secs: 1.0,
            partial_lines: PartialLinePolicy::Wait,
            on_truncate: TruncationPolicy::Replay,
            on_missing: MissingPolicy::KeepWaiting,
            channel_capacity: 1024,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            grep: None,
            case_sensitive: false,
            fixed_strings: false,
            banners: true,
        }
    }
}

impl TailConfig {
    /// Load config from `path`.
    ///
    /// A missing file yields defaults unless `required` is set (an explicit
    /// `--config`); a file that exists but does not parse is always an error.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::parse(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })
    }

    /// Resolve the follow section into session options.
    pub fn follow_options(&self) -> Result<FollowOptions, ConfigError> {
        let secs = self.follow.sleep_interval_secs;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ConfigError::Invalid {
                detail: format!("sleep interval must be a positive number of seconds, got {secs}"),
            });
        }
        let poll_interval =
            Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Invalid {
                detail: format!("sleep interval {secs} out of range: {e}"),
            })?;
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                detail: format!("sleep interval {secs} rounds down to zero"),
            });
        }

        Ok(FollowOptions {
            initial_lines: self.follow.lines,
            poll_interval,
            partial_lines: self.follow.partial_lines,
            on_truncate: self.follow.on_truncate,
            on_missing: self.follow.on_missing,
        })
    }
}

/// Errors from loading or resolving configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        detail: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
            ConfigError::Invalid { detail } => write!(f, "invalid config: {detail}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}
