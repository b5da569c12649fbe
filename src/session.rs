//! Session lifecycle: open the file, emit the initial window, then run a
//! follower on its own worker thread until cancelled.

use crate::cancel::CancelToken;
use crate::error::FollowError;
use crate::follower::{FollowOptions, Follower};
use crate::sink::{ChannelSink, FollowEvent, Sink, StopReason};
use crate::source::LocalFile;
use crate::window::read_last_lines;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Events of one session as an async stream. Ends after `Stopped`.
pub type EventStream = ReceiverStream<FollowEvent>;

/// Handle to a running session.
///
/// Dropping the handle does not stop the session; call `cancel`.
pub struct SessionHandle {
    path: PathBuf,
    cancel: CancelToken,
    thread: Option<JoinHandle<StopReason>>,
}

impl SessionHandle {
    /// Ask the session to stop. Returns immediately; the follower observes
    /// the request within one poll interval.
    pub fn cancel(&self) {
        tracing::debug!(path = %self.path.display(), "cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the worker thread to end.
    pub fn join(mut self) -> StopReason {
        match self.thread.take().map(|t| t.join()) {
            Some(Ok(reason)) => reason,
            Some(Err(_)) => {
                tracing::error!(path = %self.path.display(), "follower thread panicked");
                StopReason::Failed
            }
            None => StopReason::Cancelled,
        }
    }
}

/// Start following `path`, delivering events to `sink`.
///
/// Opening the file and reading the initial window happen before this
/// returns, so a missing or unreadable file is an `Err` here rather than an
/// event.
pub fn start<S>(
    path: impl AsRef<Path>,
    options: FollowOptions,
    sink: S,
) -> Result<SessionHandle, FollowError>
where
    S: Sink + Send + 'static,
{
    options.validate()?;
    let path = path.as_ref().to_path_buf();
    let mut source = LocalFile::open(&path)?;
    let window = read_last_lines(&mut source, options.initial_lines)
        .map_err(|e| FollowError::from_io(&path, e))?;

    let cancel = CancelToken::new();
    let token = cancel.clone();
    let thread = std::thread::Builder::new()
        .name("logtail-follow".to_string())
        .spawn(move || {
            let mut sink = sink;
            for line in &window.lines {
                sink.on_line(line);
            }
            Follower::new(source, sink, window.cursor, options).run(&token)
        })
        .map_err(|e| FollowError::Io {
            path: path.clone(),
            source: e,
        })?;

    Ok(SessionHandle {
        path,
        cancel,
        thread: Some(thread),
    })
}

/// Start following `path` and receive events as a stream.
///
/// `capacity` bounds the events buffered between the follower and the
/// consumer; when full the follower waits.
pub fn stream(
    path: impl AsRef<Path>,
    options: FollowOptions,
    capacity: usize,
) -> Result<(SessionHandle, EventStream), FollowError> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = start(path, options, ChannelSink::new(tx))?;
    Ok((handle, ReceiverStream::new(rx)))
}
