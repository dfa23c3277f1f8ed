//! Event types for the Dreams event system
//!
//! The scheduler and the stream daemon emit discrete status events
//! ("now playing", "next up", state changes). Presentation layers subscribe
//! through the [`EventBus`]; the core does not care how they are displayed.

use crate::catalog::ClipId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Scheduler session state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    /// Fade-to-silence in progress
    Stopping,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Dreams event types
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DreamsEvent {
    /// Session state changed (idle/playing/stopping)
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: DateTime<Utc>,
    },

    /// A clip became the audible "current" clip
    NowPlaying {
        clip_id: ClipId,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// Preview of the clip expected after the current one
    NextUp {
        clip_id: ClipId,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// Crossfade ramp issued between two clips
    CrossfadeStarted {
        from_clip: ClipId,
        to_clip: ClipId,
        duration_s: f64,
        timestamp: DateTime<Utc>,
    },

    /// A clip could not be started (asset missing or undecodable)
    ClipUnavailable {
        clip_id: ClipId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Play count incremented after a clip start
    PlayCountChanged {
        clip_id: ClipId,
        count: u64,
        timestamp: DateTime<Utc>,
    },

    /// Master volume changed (0.0-1.0)
    VolumeChanged {
        volume: f64,
        timestamp: DateTime<Utc>,
    },

    /// A client opened a served stream
    StreamOpened {
        stream_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A served stream started encoding the next segment
    StreamSegment {
        stream_id: Uuid,
        current_clip: ClipId,
        next_clip: ClipId,
        timestamp: DateTime<Utc>,
    },

    /// A served stream ended
    StreamClosed {
        stream_id: Uuid,
        reason: String,
        segments: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DreamsEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            DreamsEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            DreamsEvent::NowPlaying { .. } => "NowPlaying",
            DreamsEvent::NextUp { .. } => "NextUp",
            DreamsEvent::CrossfadeStarted { .. } => "CrossfadeStarted",
            DreamsEvent::ClipUnavailable { .. } => "ClipUnavailable",
            DreamsEvent::PlayCountChanged { .. } => "PlayCountChanged",
            DreamsEvent::VolumeChanged { .. } => "VolumeChanged",
            DreamsEvent::StreamOpened { .. } => "StreamOpened",
            DreamsEvent::StreamSegment { .. } => "StreamSegment",
            DreamsEvent::StreamClosed { .. } => "StreamClosed",
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// see a lag error instead of stalling the scheduler.
///
/// # Examples
///
/// ```
/// use dreams_common::events::{DreamsEvent, EventBus, PlaybackState};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(DreamsEvent::PlaybackStateChanged {
///     old_state: PlaybackState::Idle,
///     new_state: PlaybackState::Playing,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DreamsEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DreamsEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when nobody is listening
    pub fn emit(
        &self,
        event: DreamsEvent,
    ) -> Result<usize, broadcast::error::SendError<DreamsEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: DreamsEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        let result = bus.emit(DreamsEvent::VolumeChanged {
            volume: 0.5,
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(DreamsEvent::NowPlaying {
            clip_id: ClipId(3),
            name: "Dm7 add11".to_string(),
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            DreamsEvent::NowPlaying { clip_id, name, .. } => {
                assert_eq!(clip_id, ClipId(3));
                assert_eq!(name, "Dm7 add11");
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_serialized_tag() {
        let event = DreamsEvent::PlaybackStateChanged {
            old_state: PlaybackState::Playing,
            new_state: PlaybackState::Stopping,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PlaybackStateChanged");
        assert_eq!(json["new_state"], "stopping");
        assert_eq!(event.event_type(), "PlaybackStateChanged");
    }
}
