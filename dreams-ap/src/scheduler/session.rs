//! Per-session scheduler state
//!
//! Two playback slots in a fixed array; the "current" role is an index that
//! flips when a crossfade completes.

use dreams_common::events::PlaybackState;
use dreams_common::Clip;
use serde::Serialize;
use std::fmt;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Index into the two-slot array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SlotIndex(usize);

impl SlotIndex {
    pub const A: SlotIndex = SlotIndex(0);
    pub const B: SlotIndex = SlotIndex(1);

    /// The other slot
    pub fn other(self) -> SlotIndex {
        SlotIndex(1 - self.0)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn both() -> [SlotIndex; 2] {
        [SlotIndex::A, SlotIndex::B]
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "A"),
            _ => write!(f, "B"),
        }
    }
}

/// One of the two concurrent playback channels
#[derive(Debug, Clone, Default)]
pub struct PlaybackSlot {
    pub clip: Option<Clip>,
    pub active: bool,
    /// Target gain of the most recent ramp
    pub gain: f32,
    pub started_at: Option<Instant>,
}

impl PlaybackSlot {
    pub fn loaded(clip: Clip, started_at: Instant) -> Self {
        Self {
            clip: Some(clip),
            active: true,
            gain: 1.0,
            started_at: Some(started_at),
        }
    }
}

/// Mutable state of one scheduler session
///
/// Only touched with the scheduler's session lock held.
#[derive(Debug, Default)]
pub struct SessionState {
    pub state: PlaybackState,
    /// Audible clip (the outgoing one during a crossfade)
    pub current: Option<Clip>,
    /// Preview of the following clip, or the incoming clip mid-crossfade
    pub next: Option<Clip>,
    pub current_slot: SlotIndex,
    pub slots: [PlaybackSlot; 2],
    /// Bumped on every stop; timer events carrying an older value are stale
    pub generation: u64,
    /// True between a crossfade trigger and its completion
    pub crossfading: bool,
    pub(crate) timers: Vec<JoinHandle<()>>,
    pub(crate) stop_timer: Option<JoinHandle<()>>,
}

impl Default for SlotIndex {
    fn default() -> Self {
        SlotIndex::A
    }
}

impl SessionState {
    pub fn slot(&self, index: SlotIndex) -> &PlaybackSlot {
        &self.slots[index.index()]
    }

    pub fn slot_mut(&mut self, index: SlotIndex) -> &mut PlaybackSlot {
        &mut self.slots[index.index()]
    }

    pub fn active_slots(&self) -> Vec<SlotIndex> {
        SlotIndex::both()
            .into_iter()
            .filter(|s| self.slot(*s).active)
            .collect()
    }

    /// Keep a timer handle, dropping handles of timers that already fired
    pub(crate) fn track_timer(&mut self, handle: JoinHandle<()>) {
        self.timers.retain(|h| !h.is_finished());
        self.timers.push(handle);
    }

    /// Abort pending trigger/complete timers
    pub(crate) fn abort_timers(&mut self) {
        for handle in self.timers.drain(..) {
            handle.abort();
        }
    }

    /// Back to an empty idle session with a new generation
    pub(crate) fn reset(&mut self) {
        self.abort_timers();
        self.state = PlaybackState::Idle;
        self.current = None;
        self.next = None;
        self.current_slot = SlotIndex::A;
        self.slots = Default::default();
        self.crossfading = false;
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_roles_flip() {
        assert_eq!(SlotIndex::A.other(), SlotIndex::B);
        assert_eq!(SlotIndex::B.other(), SlotIndex::A);
        assert_eq!(SlotIndex::A.other().other(), SlotIndex::A);
        assert_eq!(SlotIndex::B.to_string(), "B");
    }

    #[tokio::test]
    async fn test_reset_clears_and_bumps_generation() {
        let mut session = SessionState::default();
        session.state = PlaybackState::Playing;
        session.current = Some(Clip::new(1, "Am", "1 Am.ogg"));
        session.current_slot = SlotIndex::B;
        *session.slot_mut(SlotIndex::B) =
            PlaybackSlot::loaded(Clip::new(1, "Am", "1 Am.ogg"), Instant::now());
        session.track_timer(tokio::spawn(std::future::pending::<()>()));

        session.reset();

        assert_eq!(session.state, PlaybackState::Idle);
        assert!(session.current.is_none());
        assert!(session.active_slots().is_empty());
        assert_eq!(session.current_slot, SlotIndex::A);
        assert_eq!(session.generation, 1);
        assert!(session.timers.is_empty());
    }
}
