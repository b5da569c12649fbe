//! The follow loop: drain appended bytes, emit complete lines, detect
//! truncation by size regression, and wait between polls.

use crate::cancel::CancelToken;
use crate::error::{is_fatal, ErrorKind, FollowError};
use crate::line::{complete_lines, decode_line};
use crate::sink::{Sink, StopReason};
use crate::source::FileSource;
use serde::Deserialize;
use std::io;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const READ_CHUNK: usize = 64 * 1024;

/// What to do with trailing bytes that have no line terminator yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialLinePolicy {
    /// Hold them until the terminator arrives; never emit a partial line.
    #[default]
    Wait,
    /// Like `Wait`, but emit whatever is buffered as a last line on cancel.
    FlushOnStop,
}

/// Where the cursor goes after a truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncationPolicy {
    /// Start over from offset 0 of the truncated file.
    #[default]
    Replay,
    /// Skip what the file holds now and only follow new appends.
    SkipToEnd,
}

/// What to do when the followed path disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingPolicy {
    /// Keep polling; a reappearing file counts as truncated to zero.
    #[default]
    KeepWaiting,
    /// Stop the session with a not-found error.
    Fail,
}

/// Per-session follow settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowOptions {
    /// Trailing lines to emit once before following; 0 starts at end of file.
    pub initial_lines: usize,
    pub poll_interval: Duration,
    pub partial_lines: PartialLinePolicy,
    pub on_truncate: TruncationPolicy,
    pub on_missing: MissingPolicy,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            initial_lines: 10,
            poll_interval: Duration::from_secs(1),
            partial_lines: PartialLinePolicy::default(),
            on_truncate: TruncationPolicy::default(),
            on_missing: MissingPolicy::default(),
        }
    }
}

impl FollowOptions {
    pub fn validate(&self) -> Result<(), FollowError> {
        if self.poll_interval.is_zero() {
            return Err(FollowError::InvalidConfig {
                detail: "poll interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    /// Draining bytes available past the read position.
    Reading,
    /// Nothing left to read; the path's size decides what comes next.
    Idle,
    /// Suspended for one poll interval.
    Waiting,
    /// The file shrank or came back; resync before reading again.
    Truncated,
    Stopped,
}

/// Follows one file on behalf of one sink.
///
/// `cursor` is the end of the last emitted line. Bytes of a line still
/// waiting for its terminator sit in `pending`, so reads continue at
/// `cursor + pending.len()`.
pub struct Follower<F, S> {
    source: F,
    sink: S,
    options: FollowOptions,
    state: FollowState,
    cursor: u64,
    pending: Vec<u8>,
    buf: Vec<u8>,
    /// Set when the last read hit end of file; cleared after a wait.
    drained: bool,
    missing: bool,
    stop_reason: Option<StopReason>,
}

impl<F: FileSource, S: Sink> Follower<F, S> {
    pub fn new(source: F, sink: S, cursor: u64, options: FollowOptions) -> Self {
        Self {
            source,
            sink,
            options,
            state: FollowState::Reading,
            cursor,
            pending: Vec::new(),
            buf: vec![0u8; READ_CHUNK],
            drained: false,
            missing: false,
            stop_reason: None,
        }
    }

    pub fn state(&self) -> FollowState {
        self.state
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn read_pos(&self) -> u64 {
        self.cursor + self.pending.len() as u64
    }

    /// Perform one state transition and return the new state.
    ///
    /// `Waiting` is returned without sleeping; the next call counts the wait
    /// as elapsed. `run` does the sleeping.
    pub fn step(&mut self) -> FollowState {
        let next = match self.state {
            FollowState::Reading => self.read(),
            FollowState::Idle => self.check_size(),
            FollowState::Waiting => {
                self.drained = false;
                FollowState::Idle
            }
            FollowState::Truncated => self.resync(),
            FollowState::Stopped => FollowState::Stopped,
        };
        if next != self.state {
            trace!(from = ?self.state, to = ?next, cursor = self.cursor, "state transition");
        }
        self.state = next;
        next
    }

    /// Follow until cancelled or failed.
    pub fn run(mut self, cancel: &CancelToken) -> StopReason {
        info!(
            path = %self.source.path().display(),
            cursor = self.cursor,
            poll_interval_ms = self.options.poll_interval.as_millis() as u64,
            "following file"
        );
        loop {
            if cancel.is_cancelled() {
                return self.stop();
            }
            match self.step() {
                FollowState::Stopped => return self.stop_reason.unwrap_or(StopReason::Failed),
                FollowState::Waiting => {
                    if cancel.wait_timeout(self.options.poll_interval) {
                        return self.stop();
                    }
                }
                _ => {}
            }
        }
    }

    /// End the session on request, honouring the partial-line policy.
    pub fn stop(&mut self) -> StopReason {
        if let Some(reason) = self.stop_reason {
            return reason;
        }
        if self.options.partial_lines == PartialLinePolicy::FlushOnStop && !self.pending.is_empty()
        {
            debug!(bytes = self.pending.len(), "flushing partial line on stop");
            self.sink.on_line(&decode_line(&self.pending));
            self.cursor += self.pending.len() as u64;
            self.pending.clear();
        }
        info!(path = %self.source.path().display(), cursor = self.cursor, "stopped following");
        self.sink.on_stopped(StopReason::Cancelled);
        self.state = FollowState::Stopped;
        self.stop_reason = Some(StopReason::Cancelled);
        StopReason::Cancelled
    }

    fn read(&mut self) -> FollowState {
        let offset = self.read_pos();
        match self.source.read_at(offset, &mut self.buf) {
            Ok(0) => {
                self.drained = true;
                FollowState::Idle
            }
            Ok(n) => {
                let scanned = self.pending.len();
                self.pending.extend_from_slice(&self.buf[..n]);
                self.emit_complete_lines(scanned);
                FollowState::Reading
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => FollowState::Reading,
            Err(e) => self.poll_error("read", e),
        }
    }

    /// Emit the lines completed by bytes appended after `pending[..scanned]`,
    /// which is known to hold no newline.
    fn emit_complete_lines(&mut self, scanned: usize) {
        let Some(last) = self.pending[scanned..].iter().rposition(|b| *b == b'\n') else {
            return;
        };
        let complete = scanned + last + 1;
        for line in complete_lines(&self.pending[..complete]) {
            self.sink.on_line(&decode_line(line));
        }
        self.cursor += complete as u64;
        self.pending.drain(..complete);
    }

    fn check_size(&mut self) -> FollowState {
        let len = match self.source.current_len() {
            Ok(Some(len)) => len,
            Ok(None) => return self.file_missing(),
            Err(e) => return self.poll_error("stat", e),
        };

        let read_pos = self.read_pos();
        if self.missing || len < read_pos {
            FollowState::Truncated
        } else if len > read_pos && !self.drained {
            FollowState::Reading
        } else {
            FollowState::Waiting
        }
    }

    fn file_missing(&mut self) -> FollowState {
        if self.options.on_missing == MissingPolicy::Fail {
            let message = format!("file '{}' no longer exists", self.source.path().display());
            return self.fail(ErrorKind::NotFound, message);
        }
        if !self.missing {
            warn!(path = %self.source.path().display(), "file is gone; waiting for it to reappear");
            self.missing = true;
        }
        FollowState::Waiting
    }

    fn resync(&mut self) -> FollowState {
        if let Err(e) = self.source.reopen() {
            if e.kind() == io::ErrorKind::NotFound {
                return self.file_missing();
            }
            return self.poll_error("reopen", e);
        }

        let new_cursor = match self.options.on_truncate {
            TruncationPolicy::Replay => 0,
            TruncationPolicy::SkipToEnd => match self.source.current_len() {
                Ok(len) => len.unwrap_or(0),
                Err(e) => return self.poll_error("stat", e),
            },
        };

        info!(
            path = %self.source.path().display(),
            old_cursor = self.cursor,
            new_cursor,
            "file truncated; restarting"
        );
        self.cursor = new_cursor;
        self.pending.clear();
        self.missing = false;
        self.drained = false;
        self.sink.on_truncated();
        FollowState::Reading
    }

    fn poll_error(&mut self, op: &str, err: io::Error) -> FollowState {
        if is_fatal(&err) {
            let message = format!("{op} failed on {}: {err}", self.source.path().display());
            return self.fail(ErrorKind::Io, message);
        }
        warn!(
            path = %self.source.path().display(),
            op,
            error = %err,
            "transient error; retrying next poll"
        );
        FollowState::Waiting
    }

    fn fail(&mut self, kind: ErrorKind, message: String) -> FollowState {
        error!(kind = %kind, %message, "follow failed");
        self.sink.on_error(kind, &message);
        self.sink.on_stopped(StopReason::Failed);
        self.stop_reason = Some(StopReason::Failed);
        FollowState::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FollowEvent, RecordingSink};
    use crate::source::memory::MemorySource;

    fn follower(
        src: &MemorySource,
        cursor: u64,
        options: FollowOptions,
    ) -> (Follower<MemorySource, RecordingSink>, RecordingSink) {
        let sink = RecordingSink::default();
        (Follower::new(src.clone(), sink.clone(), cursor, options), sink)
    }

    /// Step until the follower wants to wait or has stopped.
    fn poll_cycle<F: FileSource, S: Sink>(f: &mut Follower<F, S>) -> FollowState {
        for _ in 0..1000 {
            match f.step() {
                s @ (FollowState::Waiting | FollowState::Stopped) => return s,
                _ => {}
            }
        }
        panic!("follower never settled");
    }

    #[test]
    fn test_appended_lines_emitted_in_order() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());
        assert_eq!(poll_cycle(&mut f), FollowState::Waiting);

        let mut expected = Vec::new();
        for batch in 0..5 {
            let mut chunk = String::new();
            for i in 0..=batch {
                let line = format!("batch {batch} line {i}");
                chunk.push_str(&line);
                chunk.push('\n');
                expected.push(line);
            }
            src.append(chunk.as_bytes());
            assert_eq!(poll_cycle(&mut f), FollowState::Waiting);
        }

        assert_eq!(sink.lines(), expected);
        assert_eq!(f.cursor(), src.current_len().unwrap().unwrap());
    }

    #[test]
    fn test_scenario_window_append_truncate() {
        // Cursor as left by a two-line initial window over "a\nb\nc\n".
        let src = MemorySource::new(b"a\nb\nc\n");
        let (mut f, sink) = follower(&src, 6, FollowOptions::default());
        poll_cycle(&mut f);
        assert!(sink.events().is_empty());

        src.append(b"d\n");
        poll_cycle(&mut f);
        assert_eq!(sink.lines(), vec!["d"]);

        src.replace(b"e\n");
        poll_cycle(&mut f);
        assert_eq!(
            sink.events(),
            vec![
                FollowEvent::Line {
                    text: "d".to_string()
                },
                FollowEvent::Truncated,
                FollowEvent::Line {
                    text: "e".to_string()
                },
            ]
        );
        assert_eq!(src.reopens(), 1);
    }

    #[test]
    fn test_start_at_end_of_large_file_emits_only_new_line() {
        let content: String = (0..1000).map(|i| format!("{i}\n")).collect();
        let src = MemorySource::new(content.as_bytes());
        let (mut f, sink) = follower(&src, content.len() as u64, FollowOptions::default());
        poll_cycle(&mut f);
        assert!(sink.events().is_empty());

        src.append(b"fresh\n");
        poll_cycle(&mut f);
        assert_eq!(sink.lines(), vec!["fresh"]);
    }

    #[test]
    fn test_partial_line_waits_for_terminator() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());

        src.append(b"partial");
        poll_cycle(&mut f);
        poll_cycle(&mut f);
        assert!(sink.events().is_empty());
        assert_eq!(f.cursor(), 0);

        src.append(b"-end\n");
        poll_cycle(&mut f);
        assert_eq!(sink.lines(), vec!["partial-end"]);
        assert_eq!(f.cursor(), 12);
    }

    #[test]
    fn test_long_line_spanning_many_reads() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());

        let piece = vec![b'x'; READ_CHUNK + 17];
        for _ in 0..4 {
            src.append(&piece);
            poll_cycle(&mut f);
            assert!(sink.events().is_empty());
        }
        src.append(b"\nnext\ntail");
        poll_cycle(&mut f);

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 4 * piece.len());
        assert!(lines[0].bytes().all(|b| b == b'x'));
        assert_eq!(lines[1], "next");
        assert_eq!(f.cursor(), (4 * piece.len() + 6) as u64);
    }

    #[test]
    fn test_partial_line_dropped_on_stop_by_default() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());
        src.append(b"done\nhalf");
        poll_cycle(&mut f);
        assert_eq!(f.stop(), StopReason::Cancelled);
        assert_eq!(
            sink.events(),
            vec![
                FollowEvent::Line {
                    text: "done".to_string()
                },
                FollowEvent::Stopped {
                    reason: StopReason::Cancelled
                },
            ]
        );
    }

    #[test]
    fn test_partial_line_flushed_on_stop_when_configured() {
        let src = MemorySource::new(b"");
        let options = FollowOptions {
            partial_lines: PartialLinePolicy::FlushOnStop,
            ..Default::default()
        };
        let (mut f, sink) = follower(&src, 0, options);
        src.append(b"half");
        poll_cycle(&mut f);
        f.stop();
        assert_eq!(sink.lines(), vec!["half"]);
        assert_eq!(f.state(), FollowState::Stopped);
    }

    #[test]
    fn test_truncation_discards_pending_partial() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());
        src.append(b"one\ntwo-unfinished");
        poll_cycle(&mut f);

        src.replace(b"new\n");
        poll_cycle(&mut f);
        assert_eq!(sink.lines(), vec!["one", "new"]);
        assert_eq!(
            sink.events()
                .iter()
                .filter(|e| **e == FollowEvent::Truncated)
                .count(),
            1
        );
    }

    #[test]
    fn test_truncation_skip_to_end_does_not_replay() {
        let src = MemorySource::new(b"");
        let options = FollowOptions {
            on_truncate: TruncationPolicy::SkipToEnd,
            ..Default::default()
        };
        let (mut f, sink) = follower(&src, 0, options);
        src.append(b"aaaa\nbbbb\n");
        poll_cycle(&mut f);

        src.replace(b"x\n");
        poll_cycle(&mut f);
        assert_eq!(f.cursor(), 2);

        src.append(b"y\n");
        poll_cycle(&mut f);
        assert_eq!(sink.lines(), vec!["aaaa", "bbbb", "y"]);
    }

    #[test]
    fn test_missing_file_keeps_waiting_then_resumes() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());
        src.append(b"before\n");
        poll_cycle(&mut f);

        src.remove();
        for _ in 0..5 {
            assert_eq!(poll_cycle(&mut f), FollowState::Waiting);
        }
        assert_eq!(sink.lines(), vec!["before"]);

        src.replace(b"after\n");
        poll_cycle(&mut f);
        assert_eq!(
            sink.events()[1..],
            [
                FollowEvent::Truncated,
                FollowEvent::Line {
                    text: "after".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_missing_file_fails_under_strict_policy() {
        let src = MemorySource::new(b"x\n");
        let options = FollowOptions {
            on_missing: MissingPolicy::Fail,
            ..Default::default()
        };
        let (mut f, sink) = follower(&src, 2, options);
        src.remove();
        assert_eq!(poll_cycle(&mut f), FollowState::Stopped);

        let events = sink.events();
        assert!(matches!(
            events[0],
            FollowEvent::Error {
                kind: ErrorKind::NotFound,
                ..
            }
        ));
        assert_eq!(
            events[1],
            FollowEvent::Stopped {
                reason: StopReason::Failed
            }
        );
    }

    #[test]
    fn test_transient_read_error_is_retried() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());
        src.append(b"kept\n");
        src.fail_next_read(io::Error::new(io::ErrorKind::TimedOut, "slow disk"));

        assert_eq!(poll_cycle(&mut f), FollowState::Waiting);
        assert!(sink.events().is_empty());

        poll_cycle(&mut f);
        assert_eq!(sink.lines(), vec!["kept"]);
    }

    #[test]
    fn test_transient_stat_error_is_retried() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());
        src.fail_next_len(io::Error::new(io::ErrorKind::Other, "blip"));
        assert_eq!(poll_cycle(&mut f), FollowState::Waiting);

        src.append(b"ok\n");
        poll_cycle(&mut f);
        assert_eq!(sink.lines(), vec!["ok"]);
    }

    #[test]
    fn test_permission_error_is_fatal() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());
        src.fail_next_read(io::Error::from(io::ErrorKind::PermissionDenied));

        assert_eq!(poll_cycle(&mut f), FollowState::Stopped);
        assert_eq!(f.step(), FollowState::Stopped);
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            FollowEvent::Error {
                kind: ErrorKind::Io,
                ..
            }
        ));

        // A later stop request does not emit a second stop event.
        assert_eq!(f.stop(), StopReason::Failed);
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn test_crlf_lines_are_trimmed() {
        let src = MemorySource::new(b"");
        let (mut f, sink) = follower(&src, 0, FollowOptions::default());
        src.append(b"dos\r\nunix\n");
        poll_cycle(&mut f);
        assert_eq!(sink.lines(), vec!["dos", "unix"]);
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let options = FollowOptions {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(FollowError::InvalidConfig { .. })
        ));
        assert!(FollowOptions::default().validate().is_ok());
    }
}
