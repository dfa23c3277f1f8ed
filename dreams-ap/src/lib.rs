//! # Dreams Audio Player Library (dreams-ap)
//!
//! Plays the endless chord stream on a local audio device.
//!
//! **Architecture:** the [`scheduler::Scheduler`] sequences clips picked by
//! the weighted selector and drives a two-slot [`audio::SlotMixer`]
//! (symphonia decode, rubato resample, cpal output). An axum API exposes
//! start/stop, status, volume and an SSE event stream.

pub mod api;
pub mod audio;
pub mod error;
pub mod scheduler;

pub use error::{Error, Result};
pub use scheduler::{Mixer, Scheduler, SchedulerEvent, SchedulerStatus, SlotIndex};
