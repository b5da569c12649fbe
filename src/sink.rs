//! Sink contract: where a follower delivers lines and lifecycle events.

use crate::error::ErrorKind;
use serde::Serialize;
use tokio::sync::mpsc;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The caller asked the session to stop.
    Cancelled,
    /// A non-recoverable error ended the session.
    Failed,
}

/// Consumer of follower output.
///
/// Called from the follower's thread, one event at a time. A slow sink slows
/// the follower down but never causes events to be dropped.
pub trait Sink {
    fn on_line(&mut self, text: &str);
    /// The file shrank and following restarts; a discontinuity marker.
    fn on_truncated(&mut self);
    fn on_error(&mut self, kind: ErrorKind, message: &str);
    /// Always the last call of a session.
    fn on_stopped(&mut self, reason: StopReason);
}

/// One sink call, as a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FollowEvent {
    Line { text: String },
    Truncated,
    Error { kind: ErrorKind, message: String },
    Stopped { reason: StopReason },
}

impl FollowEvent {
    /// Replay this event into `sink`.
    pub fn dispatch<S: Sink + ?Sized>(&self, sink: &mut S) {
        match self {
            FollowEvent::Line { text } => sink.on_line(text),
            FollowEvent::Truncated => sink.on_truncated(),
            FollowEvent::Error { kind, message } => sink.on_error(*kind, message),
            FollowEvent::Stopped { reason } => sink.on_stopped(*reason),
        }
    }
}

/// Sink that forwards events over a bounded tokio channel.
///
/// Must be driven from a non-async thread: `blocking_send` waits for room,
/// which is the back-pressure toward the follower.
pub struct ChannelSink {
    tx: mpsc::Sender<FollowEvent>,
    closed: bool,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<FollowEvent>) -> Self {
        Self { tx, closed: false }
    }

    fn send(&mut self, event: FollowEvent) {
        if self.closed {
            return;
        }
        if self.tx.blocking_send(event).is_err() {
            tracing::debug!("event receiver dropped; discarding further events");
            self.closed = true;
        }
    }
}

impl Sink for ChannelSink {
    fn on_line(&mut self, text: &str) {
        self.send(FollowEvent::Line {
            text: text.to_string(),
        });
    }

    fn on_truncated(&mut self) {
        self.send(FollowEvent::Truncated);
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.send(FollowEvent::Error {
            kind,
            message: message.to_string(),
        });
    }

    fn on_stopped(&mut self, reason: StopReason) {
        self.send(FollowEvent::Stopped { reason });
    }
}

/// Sink that records every event, for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSink {
    events: std::sync::Arc<std::sync::Mutex<Vec<FollowEvent>>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<FollowEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FollowEvent::Line { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Poll until `pred` holds or `timeout` passes.
    pub fn wait_for(
        &self,
        timeout: std::time::Duration,
        pred: impl Fn(&[FollowEvent]) -> bool,
    ) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if pred(&self.events.lock().unwrap()) {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    fn push(&self, event: FollowEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
impl Sink for RecordingSink {
    fn on_line(&mut self, text: &str) {
        self.push(FollowEvent::Line {
            text: text.to_string(),
        });
    }

    fn on_truncated(&mut self) {
        self.push(FollowEvent::Truncated);
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.push(FollowEvent::Error {
            kind,
            message: message.to_string(),
        });
    }

    fn on_stopped(&mut self, reason: StopReason) {
        self.push(FollowEvent::Stopped { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&FollowEvent::Line {
            text: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"line","text":"hi"}"#);

        let json = serde_json::to_string(&FollowEvent::Stopped {
            reason: StopReason::Cancelled,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"stopped","reason":"cancelled"}"#);
    }

    #[test]
    fn test_dispatch_round_trips_into_sink() {
        let mut sink = RecordingSink::default();
        let events = vec![
            FollowEvent::Line {
                text: "a".to_string(),
            },
            FollowEvent::Truncated,
            FollowEvent::Error {
                kind: ErrorKind::Io,
                message: "x".to_string(),
            },
            FollowEvent::Stopped {
                reason: StopReason::Failed,
            },
        ];
        for event in &events {
            event.dispatch(&mut sink);
        }
        assert_eq!(sink.events(), events);
    }

    #[test]
    fn test_channel_sink_preserves_order() {
        let (tx, mut rx) = mpsc::channel(1);
        let producer = std::thread::spawn(move || {
            let mut sink = ChannelSink::new(tx);
            for i in 0..50 {
                sink.on_line(&i.to_string());
            }
            sink.on_stopped(StopReason::Cancelled);
        });

        let mut received = Vec::new();
        while let Some(event) = rx.blocking_recv() {
            received.push(event);
        }
        producer.join().unwrap();

        assert_eq!(received.len(), 51);
        for (i, event) in received.iter().take(50).enumerate() {
            assert_eq!(
                event,
                &FollowEvent::Line {
                    text: i.to_string()
                }
            );
        }
    }

    #[test]
    fn test_channel_sink_tolerates_dropped_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        sink.on_line("ignored");
        sink.on_stopped(StopReason::Cancelled);
    }
}
