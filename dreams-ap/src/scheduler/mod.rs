//! Playback scheduler
//!
//! Drives one endless session: the current clip plays on one slot, and
//! `T = D - X` seconds after it started the next clip starts silently on the
//! other slot while both gains ramp over `X`. When the ramp ends the roles
//! flip and the cycle repeats.
//!
//! Deferred work is modelled as [`SchedulerEvent`]s delivered by tokio timer
//! tasks. Each event carries the session generation it was scheduled under;
//! `stop` bumps the generation, so late events are ignored. All handlers run
//! under one session lock and never interleave.

mod mixer;
mod session;

pub use mixer::Mixer;
pub use session::{PlaybackSlot, SessionState, SlotIndex};

use chrono::Utc;
use dreams_common::events::{DreamsEvent, EventBus, PlaybackState};
use dreams_common::{Clip, ClipId, CrossfadeTiming, Error, Result, Selector};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Timed scheduler events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Start the overlap into the next clip
    CrossfadeTrigger { generation: u64 },
    /// Overlap finished; promote the incoming slot
    CrossfadeComplete { generation: u64 },
    /// Stop fade finished; return to idle
    StopComplete { generation: u64 },
}

impl SchedulerEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SchedulerEvent::CrossfadeTrigger { generation }
            | SchedulerEvent::CrossfadeComplete { generation }
            | SchedulerEvent::StopComplete { generation } => *generation,
        }
    }
}

/// Point-in-time view for the status API
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: PlaybackState,
    pub now_playing: Option<Clip>,
    pub next_up: Option<Clip>,
    pub crossfading: bool,
    pub current_slot: SlotIndex,
    pub active_slots: usize,
    pub generation: u64,
}

struct Inner<M: Mixer + ?Sized> {
    selector: Arc<Selector>,
    mixer: Arc<M>,
    timing: CrossfadeTiming,
    events: EventBus,
    session: Mutex<SessionState>,
}

/// Handle to a scheduler session (cheap to clone)
pub struct Scheduler<M: Mixer + ?Sized = dyn Mixer> {
    inner: Arc<Inner<M>>,
}

impl<M: Mixer + ?Sized> Clone for Scheduler<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Mixer + ?Sized> Scheduler<M> {
    pub fn new(selector: Arc<Selector>, mixer: Arc<M>, timing: CrossfadeTiming, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                selector,
                mixer,
                timing,
                events,
                session: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn timing(&self) -> CrossfadeTiming {
        self.inner.timing
    }

    pub fn selector(&self) -> &Arc<Selector> {
        &self.inner.selector
    }

    pub fn mixer(&self) -> &Arc<M> {
        &self.inner.mixer
    }

    pub async fn state(&self) -> PlaybackState {
        self.inner.session.lock().await.state
    }

    pub async fn generation(&self) -> u64 {
        self.inner.session.lock().await.generation
    }

    pub async fn status(&self) -> SchedulerStatus {
        let s = self.inner.session.lock().await;
        SchedulerStatus {
            state: s.state,
            now_playing: s.current.clone(),
            next_up: s.next.clone(),
            crossfading: s.crossfading,
            current_slot: s.current_slot,
            active_slots: s.active_slots().len(),
            generation: s.generation,
        }
    }

    /// Begin an endless session
    ///
    /// No-op while playing. While stopping, the stop is finished immediately
    /// and a fresh session starts. If the first clip cannot be started the
    /// session stays idle and the asset error is returned.
    pub async fn start(&self) -> Result<()> {
        let mut s = self.inner.session.lock().await;

        match s.state {
            PlaybackState::Playing => {
                debug!("start() ignored: already playing");
                return Ok(());
            }
            PlaybackState::Stopping => {
                debug!("start() during stop fade: finishing stop first");
                if let Some(handle) = s.stop_timer.take() {
                    handle.abort();
                }
                self.finish_stop(&mut s);
            }
            PlaybackState::Idle => {}
        }

        let first = self.inner.selector.select_next(None).await?;
        let slot = SlotIndex::A;

        if let Err(e) = self.inner.mixer.start_clip(slot, &first, 0.0) {
            if let Error::AssetUnavailable { clip, reason } = &e {
                self.emit(DreamsEvent::ClipUnavailable {
                    clip_id: *clip,
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
            }
            warn!("Failed to start clip {} ({}): {}", first.id, first.name, e);
            return Err(e);
        }

        let now = Instant::now();
        let timing = self.inner.timing;
        self.inner.mixer.ramp_gain(slot, 0.0, 1.0, timing.fade_in());

        s.current_slot = slot;
        *s.slot_mut(slot) = PlaybackSlot::loaded(first.clone(), now);
        s.current = Some(first.clone());
        s.state = PlaybackState::Playing;

        info!("Playback started with clip {} ({})", first.id, first.name);
        self.emit(DreamsEvent::PlaybackStateChanged {
            old_state: PlaybackState::Idle,
            new_state: PlaybackState::Playing,
            timestamp: Utc::now(),
        });
        self.emit_now_playing(&first);

        self.record_play(first.id).await;

        let generation = s.generation;
        let handle = self.schedule(
            now + timing.trigger_offset(),
            SchedulerEvent::CrossfadeTrigger { generation },
        );
        s.track_timer(handle);

        self.refresh_preview(&mut s).await;
        Ok(())
    }

    /// Fade every active slot to silence, then return to idle
    ///
    /// No-op while idle or already stopping.
    pub async fn stop(&self) {
        let mut s = self.inner.session.lock().await;
        match s.state {
            PlaybackState::Playing => self.begin_stop(&mut s),
            state => debug!("stop() ignored in state {}", state),
        }
    }

    /// Deliver a timed event
    ///
    /// Events from an older generation (or that no longer apply to the
    /// current state) are ignored.
    pub async fn dispatch(&self, event: SchedulerEvent) {
        let mut s = self.inner.session.lock().await;

        if event.generation() != s.generation {
            debug!(
                "Ignoring stale {:?} (session generation {})",
                event, s.generation
            );
            return;
        }

        match event {
            SchedulerEvent::CrossfadeTrigger { .. } => {
                if s.state != PlaybackState::Playing || s.crossfading {
                    debug!("Ignoring crossfade trigger in state {}", s.state);
                    return;
                }
                self.on_crossfade_trigger(&mut s).await;
            }
            SchedulerEvent::CrossfadeComplete { .. } => {
                if !s.crossfading {
                    debug!("Ignoring crossfade complete: no crossfade in progress");
                    return;
                }
                self.on_crossfade_complete(&mut s).await;
            }
            SchedulerEvent::StopComplete { .. } => {
                if s.state != PlaybackState::Stopping {
                    debug!("Ignoring stop complete in state {}", s.state);
                    return;
                }
                // Running inside this timer's own task: drop the handle, don't abort it
                s.stop_timer.take();
                self.finish_stop(&mut s);
            }
        }
    }

    async fn on_crossfade_trigger(&self, s: &mut SessionState) {
        let Some(current) = s.current.clone() else {
            warn!("Crossfade trigger without a current clip");
            return;
        };

        let outgoing = s.current_slot;
        let incoming = outgoing.other();
        let mut excluded = vec![current.id];

        // Retry with each unavailable clip excluded until candidates run out
        let next = loop {
            let candidate = match self.inner.selector.select_excluding(&excluded).await {
                Ok(clip) => clip,
                Err(e) => {
                    warn!("No clip can follow {} ({}): {}; stopping", current.id, current.name, e);
                    self.begin_stop(s);
                    return;
                }
            };

            match self.inner.mixer.start_clip(incoming, &candidate, 0.0) {
                Ok(()) => break candidate,
                Err(e) => {
                    warn!("Skipping clip {} ({}): {}", candidate.id, candidate.name, e);
                    self.emit(DreamsEvent::ClipUnavailable {
                        clip_id: candidate.id,
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    excluded.push(candidate.id);
                }
            }
        };

        let now = Instant::now();
        let timing = self.inner.timing;

        *s.slot_mut(incoming) = PlaybackSlot::loaded(next.clone(), now);
        s.slot_mut(outgoing).gain = 0.0;
        s.next = Some(next.clone());
        s.crossfading = true;

        self.inner.mixer.ramp_gain(outgoing, 1.0, 0.0, timing.crossfade());
        self.inner.mixer.ramp_gain(incoming, 0.0, 1.0, timing.crossfade());

        debug!(
            "Crossfade {} ({}) -> {} ({}) on slot {} over {:.1}s",
            current.id,
            current.name,
            next.id,
            next.name,
            incoming,
            timing.crossfade_s
        );
        self.emit(DreamsEvent::CrossfadeStarted {
            from_clip: current.id,
            to_clip: next.id,
            duration_s: timing.crossfade_s,
            timestamp: Utc::now(),
        });
        self.emit(DreamsEvent::NextUp {
            clip_id: next.id,
            name: next.name.clone(),
            timestamp: Utc::now(),
        });

        self.record_play(next.id).await;

        let generation = s.generation;
        let handle = self.schedule(
            now + timing.crossfade(),
            SchedulerEvent::CrossfadeComplete { generation },
        );
        s.track_timer(handle);
    }

    async fn on_crossfade_complete(&self, s: &mut SessionState) {
        let outgoing = s.current_slot;
        let incoming = outgoing.other();

        self.inner.mixer.stop_clip(outgoing);
        *s.slot_mut(outgoing) = PlaybackSlot::default();

        s.current_slot = incoming;
        s.current = s.slot(incoming).clip.clone();
        s.next = None;
        s.crossfading = false;

        if let Some(clip) = s.current.clone() {
            debug!("Now playing clip {} ({}) on slot {}", clip.id, clip.name, incoming);
            self.emit_now_playing(&clip);
        }

        if s.state == PlaybackState::Playing {
            self.refresh_preview(s).await;

            if let Some(started_at) = s.slot(incoming).started_at {
                let generation = s.generation;
                let handle = self.schedule(
                    started_at + self.inner.timing.trigger_offset(),
                    SchedulerEvent::CrossfadeTrigger { generation },
                );
                s.track_timer(handle);
            }
        }
    }

    fn begin_stop(&self, s: &mut SessionState) {
        let fade = self.inner.timing.stop_fade();

        for slot in s.active_slots() {
            let from = self.inner.mixer.current_gain(slot);
            self.inner.mixer.ramp_gain(slot, from, 0.0, fade);
            s.slot_mut(slot).gain = 0.0;
        }

        let old_state = s.state;
        s.state = PlaybackState::Stopping;
        info!("Stopping playback ({:.1}s fade)", self.inner.timing.stop_fade_s);
        self.emit(DreamsEvent::PlaybackStateChanged {
            old_state,
            new_state: PlaybackState::Stopping,
            timestamp: Utc::now(),
        });

        let generation = s.generation;
        s.stop_timer = Some(self.schedule(
            Instant::now() + fade,
            SchedulerEvent::StopComplete { generation },
        ));
    }

    fn finish_stop(&self, s: &mut SessionState) {
        for slot in SlotIndex::both() {
            if s.slot(slot).active {
                self.inner.mixer.stop_clip(slot);
            }
        }

        let old_state = s.state;
        s.reset();

        info!("Playback stopped");
        self.emit(DreamsEvent::PlaybackStateChanged {
            old_state,
            new_state: PlaybackState::Idle,
            timestamp: Utc::now(),
        });
    }

    /// Compute and publish the next-clip preview (no play recorded)
    async fn refresh_preview(&self, s: &mut SessionState) {
        let exclude = s.current.as_ref().map(|c| c.id);
        match self.inner.selector.select_next(exclude).await {
            Ok(clip) => {
                self.emit(DreamsEvent::NextUp {
                    clip_id: clip.id,
                    name: clip.name.clone(),
                    timestamp: Utc::now(),
                });
                s.next = Some(clip);
            }
            Err(e) => {
                debug!("No next-up preview: {}", e);
                s.next = None;
            }
        }
    }

    /// Count one clip start; persistence failures are logged, playback continues
    async fn record_play(&self, id: ClipId) {
        match self.inner.selector.play_counts().increment(id).await {
            Ok(count) => self.emit(DreamsEvent::PlayCountChanged {
                clip_id: id,
                count,
                timestamp: Utc::now(),
            }),
            Err(e) => warn!("Failed to record play of clip {}: {}", id, e),
        }
    }

    /// Spawn a timer task that delivers `event` at `at`
    fn schedule(&self, at: Instant, event: SchedulerEvent) -> tokio::task::JoinHandle<()> {
        debug!("Scheduling {:?} in {:?}", event, at.saturating_duration_since(Instant::now()));
        let weak: Weak<Inner<M>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            sleep_until(at).await;
            if let Some(inner) = weak.upgrade() {
                Scheduler { inner }.dispatch(event).await;
            }
        })
    }

    fn emit_now_playing(&self, clip: &Clip) {
        self.emit(DreamsEvent::NowPlaying {
            clip_id: clip.id,
            name: clip.name.clone(),
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: DreamsEvent) {
        self.inner.events.emit_lossy(event);
    }
}
