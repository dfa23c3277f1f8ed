//! # Dreams Common Library
//!
//! Shared code for the Dreams player (dreams-ap) and stream daemon (dreams-sd):
//! - Clip catalog
//! - Play-count store and weighted clip selector
//! - Crossfade timing and fade curve definitions
//! - Event types (DreamsEvent) and SSE helper
//! - Configuration loading and settings database

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod play_counts;
pub mod selector;
pub mod sse;
pub mod timing;

pub use catalog::{Catalog, Clip, ClipId};
pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
pub use play_counts::{PlayCountStore, PlayCounts};
pub use selector::Selector;
pub use timing::CrossfadeTiming;
