//! # Dreams Stream Daemon Library (dreams-sd)
//!
//! Serves the endless chord stream over HTTP as Ogg/Opus.
//!
//! **Architecture:** every `/stream` connection runs its own
//! [`session::StreamSession`], which selects clips through the shared
//! weighted selector and hands each clip pair to a
//! [`encoder::SegmentEncoder`] (ffmpeg in production). Encoded bytes flow
//! through a bounded channel into the response body.

pub mod api;
pub mod encoder;
pub mod session;

pub use encoder::{CrossfadeDirective, FfmpegEncoder, SegmentEncoder, SegmentJob, SegmentOutcome};
pub use session::{CloseReason, SessionSummary, StreamSession, StreamSettings, StreamTracker};
