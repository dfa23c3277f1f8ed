//! Test helpers for dreams-ap integration tests
//!
//! - RecordingMixer: logs every mixer intent with its offset from test start
//! - scheduler fixtures on an in-memory play-count store

#![allow(dead_code)]

use dreams_ap::{Mixer, Scheduler, SlotIndex};
use dreams_common::events::EventBus;
use dreams_common::{Catalog, Clip, ClipId, CrossfadeTiming, Error, PlayCountStore, Result, Selector};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// One recorded mixer intent
#[derive(Debug, Clone, PartialEq)]
pub enum MixerCall {
    Start { slot: SlotIndex, clip: ClipId },
    Ramp { slot: SlotIndex, from: f32, to: f32, duration: Duration },
    Stop { slot: SlotIndex },
}

/// Mixer stand-in that records calls instead of producing audio
pub struct RecordingMixer {
    origin: Instant,
    calls: Mutex<Vec<(Duration, MixerCall)>>,
    unavailable: Mutex<HashSet<ClipId>>,
    gains: Mutex<[f32; 2]>,
}

impl RecordingMixer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            calls: Mutex::new(Vec::new()),
            unavailable: Mutex::new(HashSet::new()),
            gains: Mutex::new([0.0; 2]),
        }
    }

    /// Make later `start_clip` calls for `id` fail with `AssetUnavailable`
    pub fn make_unavailable(&self, id: ClipId) {
        self.unavailable.lock().unwrap().insert(id);
    }

    pub fn calls(&self) -> Vec<(Duration, MixerCall)> {
        self.calls.lock().unwrap().clone()
    }

    /// Successful clip starts as (offset, slot, clip)
    pub fn starts(&self) -> Vec<(Duration, SlotIndex, ClipId)> {
        self.calls()
            .into_iter()
            .filter_map(|(at, call)| match call {
                MixerCall::Start { slot, clip } => Some((at, slot, clip)),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<(Duration, SlotIndex)> {
        self.calls()
            .into_iter()
            .filter_map(|(at, call)| match call {
                MixerCall::Stop { slot } => Some((at, slot)),
                _ => None,
            })
            .collect()
    }

    pub fn ramps(&self) -> Vec<(Duration, MixerCall)> {
        self.calls()
            .into_iter()
            .filter(|(_, call)| matches!(call, MixerCall::Ramp { .. }))
            .collect()
    }

    fn record(&self, call: MixerCall) {
        let at = Instant::now().duration_since(self.origin);
        self.calls.lock().unwrap().push((at, call));
    }
}

impl Mixer for RecordingMixer {
    fn start_clip(&self, slot: SlotIndex, clip: &Clip, gain: f32) -> Result<()> {
        if self.unavailable.lock().unwrap().contains(&clip.id) {
            return Err(Error::asset_unavailable(clip.id, "marked unavailable by test"));
        }
        self.gains.lock().unwrap()[slot.index()] = gain;
        self.record(MixerCall::Start { slot, clip: clip.id });
        Ok(())
    }

    fn ramp_gain(&self, slot: SlotIndex, from: f32, to: f32, duration: Duration) {
        // Report the ramp target immediately; tests only care about intents
        self.gains.lock().unwrap()[slot.index()] = to;
        self.record(MixerCall::Ramp { slot, from, to, duration });
    }

    fn stop_clip(&self, slot: SlotIndex) {
        self.gains.lock().unwrap()[slot.index()] = 0.0;
        self.record(MixerCall::Stop { slot });
    }

    fn current_gain(&self, slot: SlotIndex) -> f32 {
        self.gains.lock().unwrap()[slot.index()]
    }
}

/// Catalog with clips numbered 1..=n
pub fn numbered_catalog(n: u32) -> Catalog {
    let clips = (1..=n)
        .map(|id| Clip::new(id, format!("Chord {}", id), format!("{}.ogg", id)))
        .collect();
    Catalog::new(clips).unwrap()
}

pub struct SchedulerFixture {
    pub scheduler: Scheduler<RecordingMixer>,
    pub mixer: Arc<RecordingMixer>,
    pub counts: Arc<PlayCountStore>,
    pub events: EventBus,
}

/// Scheduler over `n` clips with default timing (D=37, X=12)
pub async fn scheduler_fixture(n: u32, seed: u64) -> SchedulerFixture {
    let catalog = Arc::new(numbered_catalog(n));
    let counts = Arc::new(PlayCountStore::in_memory(&catalog).await);
    let selector = Arc::new(Selector::with_seed(catalog, Arc::clone(&counts), seed));
    let mixer = Arc::new(RecordingMixer::new());
    let events = EventBus::new(1000);
    let scheduler = Scheduler::new(
        selector,
        Arc::clone(&mixer),
        CrossfadeTiming::default(),
        events.clone(),
    );

    SchedulerFixture {
        scheduler,
        mixer,
        counts,
        events,
    }
}

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}
