//! Error taxonomy for opening and following a file.
//!
//! Truncation and cancellation are not errors: they travel as events
//! (`FollowEvent::Truncated`, `StopReason::Cancelled`).

use nix::errno::Errno;
use std::path::PathBuf;

/// Errors surfaced to the caller when a session cannot start.
#[derive(Debug)]
pub enum FollowError {
    /// The target path does not exist at open time.
    NotFound { path: PathBuf },
    /// Opening or reading the file failed.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Options rejected before the session started.
    InvalidConfig { detail: String },
}

impl FollowError {
    /// Build from an I/O error, mapping `NotFound` to its own variant.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            FollowError::NotFound { path }
        } else {
            FollowError::Io { path, source }
        }
    }

    /// The kind reported to sinks for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FollowError::NotFound { .. } => ErrorKind::NotFound,
            FollowError::Io { .. } | FollowError::InvalidConfig { .. } => ErrorKind::Io,
        }
    }
}

impl std::fmt::Display for FollowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FollowError::NotFound { path } => {
                write!(f, "file '{}' not found", path.display())
            }
            FollowError::Io { path, source } => {
                write!(f, "I/O error on {}: {source}", path.display())
            }
            FollowError::InvalidConfig { detail } => write!(f, "invalid options: {detail}"),
        }
    }
}

impl std::error::Error for FollowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FollowError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error category passed to `Sink::on_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => f.write_str("not found"),
            ErrorKind::Io => f.write_str("I/O error"),
        }
    }
}

/// Whether an error hit while polling should end the session.
///
/// Permission and device failures are fatal; everything else is retried on
/// the next poll cycle.
pub fn is_fatal(err: &std::io::Error) -> bool {
    use std::io::ErrorKind as K;
    if matches!(err.kind(), K::PermissionDenied | K::Unsupported) {
        return true;
    }
    match err.raw_os_error() {
        Some(code) => [Errno::EIO, Errno::ENXIO, Errno::ENODEV, Errno::EISDIR, Errno::EACCES]
            .iter()
            .any(|e| *e as i32 == code),
        None => false,
    }
}
