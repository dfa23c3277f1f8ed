//! Mix collaborator seam
//!
//! The scheduler only issues high-level intents; the implementation decides
//! how gain ramps are realized (software mixer, test recorder).

use super::session::SlotIndex;
use dreams_common::{Clip, Result};
use std::time::Duration;

pub trait Mixer: Send + Sync + 'static {
    /// Begin playing `clip` from its start on `slot` at `gain`
    ///
    /// Fails with `Error::AssetUnavailable` when the clip cannot be played.
    fn start_clip(&self, slot: SlotIndex, clip: &Clip, gain: f32) -> Result<()>;

    /// Ramp the slot's gain from `from` to `to` over `duration`
    fn ramp_gain(&self, slot: SlotIndex, from: f32, to: f32, duration: Duration);

    /// Silence and unload the slot
    fn stop_clip(&self, slot: SlotIndex);

    /// Gain the slot is producing right now (mid-ramp value included)
    fn current_gain(&self, slot: SlotIndex) -> f32;
}
