//! Terminal sink for the CLI: lines to stdout, status banners to stderr,
//! or everything as JSON lines on stdout.

use crate::error::ErrorKind;
use crate::sink::{FollowEvent, Sink, StopReason};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Raw lines, banners on stderr.
    #[default]
    Text,
    /// One JSON object per event, with a timestamp.
    Json,
}

pub struct TerminalSink<W, E> {
    out: W,
    err: E,
    format: OutputFormat,
    /// Informational banners (monitoring started/stopped).
    banners: bool,
    /// Whether truncation replays from the start of the file.
    replay: bool,
    name: String,
    broken: bool,
}

impl TerminalSink<io::Stdout, io::Stderr> {
    pub fn stdio(name: impl Into<String>, format: OutputFormat) -> Self {
        Self::new(io::stdout(), io::stderr(), name, format)
    }
}

impl<W: Write, E: Write> TerminalSink<W, E> {
    pub fn new(out: W, err: E, name: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            out,
            err,
            format,
            banners: true,
            replay: true,
            name: name.into(),
            broken: false,
        }
    }

    pub fn with_banners(mut self, banners: bool) -> Self {
        self.banners = banners;
        self
    }

    pub fn with_replay(mut self, replay: bool) -> Self {
        self.replay = replay;
        self
    }

    /// Stdout could not be written (e.g. closed pipe); further output is
    /// discarded.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Announce that following has begun.
    pub fn started(&mut self) {
        if self.banners && self.format == OutputFormat::Text {
            let msg = format!(
                "==> Monitoring {} for changes (Ctrl+C to stop) <==",
                self.name
            );
            self.banner(&msg);
        }
    }

    fn banner(&mut self, msg: &str) {
        if let Err(e) = writeln!(self.err, "{msg}").and_then(|_| self.err.flush()) {
            tracing::debug!(error = %e, "failed to write banner");
        }
    }

    fn write_out(&mut self, text: &str) {
        if self.broken {
            return;
        }
        if let Err(e) = writeln!(self.out, "{text}").and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "stdout closed; discarding output");
            self.broken = true;
        }
    }

    fn write_json(&mut self, event: FollowEvent) {
        let mut value = match serde_json::to_value(&event) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize event");
                return;
            }
        };
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "at".to_string(),
                Utc::now()
                    .to_rfc3339_opts(SecondsFormat::Millis, true)
                    .into(),
            );
        }
        self.write_out(&value.to_string());
    }
}

impl<W: Write, E: Write> Sink for TerminalSink<W, E> {
    fn on_line(&mut self, text: &str) {
        match self.format {
            OutputFormat::Text => self.write_out(text),
            OutputFormat::Json => self.write_json(FollowEvent::Line {
                text: text.to_string(),
            }),
        }
    }

    fn on_truncated(&mut self) {
        match self.format {
            OutputFormat::Text if self.replay => {
                self.banner("\n==> File truncated, restarting from beginning <==")
            }
            OutputFormat::Text => self.banner("\n==> File truncated, following new content <=="),
            OutputFormat::Json => self.write_json(FollowEvent::Truncated),
        }
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        match self.format {
            OutputFormat::Text => {
                let msg = match kind {
                    ErrorKind::NotFound => format!("Error: File '{}' not found", self.name),
                    ErrorKind::Io => format!("==> Monitoring failed: {message} <=="),
                };
                self.banner(&msg);
            }
            OutputFormat::Json => self.write_json(FollowEvent::Error {
                kind,
                message: message.to_string(),
            }),
        }
    }

    fn on_stopped(&mut self, reason: StopReason) {
        match self.format {
            OutputFormat::Text => {
                if reason == StopReason::Cancelled && self.banners {
                    self.banner("\n==> Monitoring stopped <==");
                }
            }
            OutputFormat::Json => self.write_json(FollowEvent::Stopped { reason }),
        }
    }
}
