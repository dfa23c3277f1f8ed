//! Crossfade timing parameters
//!
//! Every clip is the same length `D`. The crossfade into the next clip lasts
//! `X` seconds and is triggered `T = D - X` seconds after the clip started, so
//! the incoming clip always gets exactly `X` seconds of lead time.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default clip duration in seconds
pub const DEFAULT_CLIP_DURATION_S: f64 = 37.0;
/// Default crossfade duration in seconds
pub const DEFAULT_CROSSFADE_S: f64 = 12.0;
/// Default fade-in applied to the very first clip
pub const DEFAULT_FADE_IN_S: f64 = 2.0;
/// Default fade-to-silence on stop
pub const DEFAULT_STOP_FADE_S: f64 = 2.0;

/// Fixed timing relationship for one session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossfadeTiming {
    /// Clip duration `D`
    pub clip_duration_s: f64,
    /// Crossfade duration `X`
    pub crossfade_s: f64,
    /// Fade-in of the first clip after start()
    pub fade_in_s: f64,
    /// Fade-out of all slots after stop()
    pub stop_fade_s: f64,
}

impl CrossfadeTiming {
    /// Validate and build timing parameters
    pub fn new(clip_duration_s: f64, crossfade_s: f64, fade_in_s: f64, stop_fade_s: f64) -> Result<Self> {
        let all = [clip_duration_s, crossfade_s, fade_in_s, stop_fade_s];
        if all.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(Error::Config(format!(
                "Timing values must be positive: clip={}s crossfade={}s fade_in={}s stop_fade={}s",
                clip_duration_s, crossfade_s, fade_in_s, stop_fade_s
            )));
        }
        if crossfade_s >= clip_duration_s {
            return Err(Error::Config(format!(
                "Crossfade ({}s) must be shorter than the clip ({}s)",
                crossfade_s, clip_duration_s
            )));
        }

        Ok(Self {
            clip_duration_s,
            crossfade_s,
            fade_in_s,
            stop_fade_s,
        })
    }

    /// Trigger offset `T = D - X`
    pub fn trigger_offset_s(&self) -> f64 {
        self.clip_duration_s - self.crossfade_s
    }

    pub fn clip_duration(&self) -> Duration {
        Duration::from_secs_f64(self.clip_duration_s)
    }

    pub fn crossfade(&self) -> Duration {
        Duration::from_secs_f64(self.crossfade_s)
    }

    pub fn trigger_offset(&self) -> Duration {
        Duration::from_secs_f64(self.trigger_offset_s())
    }

    pub fn fade_in(&self) -> Duration {
        Duration::from_secs_f64(self.fade_in_s)
    }

    pub fn stop_fade(&self) -> Duration {
        Duration::from_secs_f64(self.stop_fade_s)
    }
}

impl Default for CrossfadeTiming {
    fn default() -> Self {
        Self {
            clip_duration_s: DEFAULT_CLIP_DURATION_S,
            crossfade_s: DEFAULT_CROSSFADE_S,
            fade_in_s: DEFAULT_FADE_IN_S,
            stop_fade_s: DEFAULT_STOP_FADE_S,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relationship() {
        let timing = CrossfadeTiming::default();
        assert_eq!(timing.trigger_offset_s(), 25.0);
        assert_eq!(timing.trigger_offset() + timing.crossfade(), timing.clip_duration());
    }

    #[test]
    fn test_rejects_crossfade_longer_than_clip() {
        assert!(CrossfadeTiming::new(10.0, 10.0, 1.0, 1.0).is_err());
        assert!(CrossfadeTiming::new(10.0, 12.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!(CrossfadeTiming::new(37.0, 0.0, 2.0, 2.0).is_err());
        assert!(CrossfadeTiming::new(37.0, 12.0, -1.0, 2.0).is_err());
        assert!(CrossfadeTiming::new(f64::NAN, 12.0, 2.0, 2.0).is_err());
    }
}
