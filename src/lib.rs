//! Follow a growing text file and emit newly appended lines, recovering
//! from truncation and rotation.
//!
//! ```no_run
//! use logtail::follower::FollowOptions;
//! use logtail::sink::FollowEvent;
//! use tokio_stream::StreamExt;
//!
//! # async fn demo() -> Result<(), logtail::error::FollowError> {
//! let (handle, mut events) = logtail::session::stream("app.log", FollowOptions::default(), 256)?;
//! while let Some(event) = events.next().await {
//!     match event {
//!         FollowEvent::Line { text } => println!("{text}"),
//!         FollowEvent::Stopped { .. } => break,
//!         _ => {}
//!     }
//! }
//! handle.cancel();
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod filter;
pub mod follower;
pub mod line;
pub mod output;
pub mod session;
pub mod signals;
pub mod sink;
pub mod source;
pub mod window;
