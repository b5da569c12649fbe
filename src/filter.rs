//! Line filter: forward only lines matching a pattern.
//!
//! Truncation, error and stop events always pass through so the consumer
//! still sees every discontinuity.

use crate::error::ErrorKind;
use crate::sink::{Sink, StopReason};
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub struct LineFilter {
    regex: Regex,
}

impl LineFilter {
    /// Build a filter. Matching is case-insensitive unless `case_sensitive`;
    /// with `fixed` the pattern is a literal substring.
    pub fn new(pattern: &str, case_sensitive: bool, fixed: bool) -> Result<Self, regex::Error> {
        let source = if fixed {
            regex::escape(pattern)
        } else {
            pattern.to_string()
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(Self { regex })
    }

    pub fn matches(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

pub struct FilterSink<S> {
    inner: S,
    filter: LineFilter,
    seen: u64,
    matched: u64,
}

impl<S: Sink> FilterSink<S> {
    pub fn new(inner: S, filter: LineFilter) -> Self {
        Self {
            inner,
            filter,
            seen: 0,
            matched: 0,
        }
    }
}

impl<S: Sink> Sink for FilterSink<S> {
    fn on_line(&mut self, text: &str) {
        self.seen += 1;
        if self.filter.matches(text) {
            self.matched += 1;
            self.inner.on_line(text);
        }
    }

    fn on_truncated(&mut self) {
        self.inner.on_truncated();
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.inner.on_error(kind, message);
    }

    fn on_stopped(&mut self, reason: StopReason) {
        tracing::debug!(seen = self.seen, matched = self.matched, "line filter summary");
        self.inner.on_stopped(reason);
    }
}
