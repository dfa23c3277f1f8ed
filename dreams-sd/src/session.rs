//! Per-connection stream sessions
//!
//! Each `/stream` connection owns one [`StreamSession`]. The session picks a
//! first and second clip, then encodes segment after segment, chaining
//! `current = next` and selecting a fresh `next` whenever a segment finishes.
//! Sessions share only the selector (catalog and play counts).

use crate::encoder::{CrossfadeDirective, SegmentEncoder, SegmentJob, SegmentOutcome};
use axum::body::Bytes;
use chrono::Utc;
use dreams_common::events::{DreamsEvent, EventBus};
use dreams_common::{Clip, CrossfadeTiming, Error, FadeCurve, Selector};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Settings shared by every session of a daemon
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub audio_dir: PathBuf,
    pub timing: CrossfadeTiming,
    pub curve: FadeCurve,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    ClientGone,
    /// No clip could be selected (catalog too small)
    NoClip(String),
    EncodeFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ClientGone => write!(f, "client disconnected"),
            CloseReason::NoClip(e) => write!(f, "no clip available: {}", e),
            CloseReason::EncodeFailed(e) => write!(f, "encode failed: {}", e),
        }
    }
}

/// Result of a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub stream_id: Uuid,
    /// Segments fully encoded and forwarded
    pub segments: u64,
    pub reason: CloseReason,
}

pub struct StreamSession<E: SegmentEncoder + ?Sized = dyn SegmentEncoder> {
    id: Uuid,
    selector: Arc<Selector>,
    encoder: Arc<E>,
    settings: StreamSettings,
    events: EventBus,
}

impl<E: SegmentEncoder + ?Sized> StreamSession<E> {
    pub fn new(selector: Arc<Selector>, encoder: Arc<E>, settings: StreamSettings, events: EventBus) -> Self {
        Self {
            id: Uuid::new_v4(),
            selector,
            encoder,
            settings,
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stream until the client leaves or the encoder fails
    pub async fn run(self, sink: mpsc::Sender<Bytes>) -> SessionSummary {
        info!("Stream {} opened", self.id);
        self.emit(DreamsEvent::StreamOpened {
            stream_id: self.id,
            timestamp: Utc::now(),
        });

        let mut segments = 0;
        let reason = self.stream_segments(&sink, &mut segments).await;

        match &reason {
            CloseReason::ClientGone => info!("Stream {} closed after {} segments", self.id, segments),
            reason => warn!("Stream {} closed after {} segments: {}", self.id, segments, reason),
        }
        self.emit(DreamsEvent::StreamClosed {
            stream_id: self.id,
            reason: reason.to_string(),
            segments,
            timestamp: Utc::now(),
        });

        SessionSummary {
            stream_id: self.id,
            segments,
            reason,
        }
    }

    async fn stream_segments(&self, sink: &mpsc::Sender<Bytes>, segments: &mut u64) -> CloseReason {
        let timing = self.settings.timing;
        let curve = self.settings.curve;

        let mut current = match self.selector.select_and_record(None).await {
            Ok(clip) => clip,
            Err(e) => return CloseReason::NoClip(e.to_string()),
        };
        let mut next = match self.select_after(&current).await {
            Ok(clip) => clip,
            Err(e) => return CloseReason::NoClip(e.to_string()),
        };
        let mut directive = CrossfadeDirective::first(&timing, curve);

        loop {
            if sink.is_closed() {
                return CloseReason::ClientGone;
            }

            debug!(
                "Stream {}: {} -> {} ({:.0}s segment)",
                self.id,
                current.name,
                next.name,
                directive.segment_duration_s()
            );
            self.emit(DreamsEvent::StreamSegment {
                stream_id: self.id,
                current_clip: current.id,
                next_clip: next.id,
                timestamp: Utc::now(),
            });

            let job = SegmentJob::new(&self.settings.audio_dir, current, next.clone(), directive);
            match self.encoder.encode(&job, sink).await {
                Ok(SegmentOutcome::Completed) => *segments += 1,
                Ok(SegmentOutcome::ClientGone) => return CloseReason::ClientGone,
                Err(e) => {
                    if let Error::AssetUnavailable { clip, reason } = &e {
                        self.emit(DreamsEvent::ClipUnavailable {
                            clip_id: *clip,
                            reason: reason.clone(),
                            timestamp: Utc::now(),
                        });
                    }
                    error!("Stream {} encode failed: {}", self.id, e);
                    return CloseReason::EncodeFailed(e.to_string());
                }
            }

            current = next;
            next = match self.select_after(&current).await {
                Ok(clip) => clip,
                Err(e) => return CloseReason::NoClip(e.to_string()),
            };
            directive = CrossfadeDirective::chained(&timing, curve);
        }
    }

    async fn select_after(&self, current: &Clip) -> dreams_common::Result<Clip> {
        self.selector.select_and_record(Some(current.id)).await
    }

    fn emit(&self, event: DreamsEvent) {
        self.events.emit_lossy(event);
    }
}

/// Counts open stream connections and ends them all on shutdown
#[derive(Debug)]
pub struct StreamTracker {
    active: AtomicUsize,
    opened: AtomicU64,
    closing: watch::Sender<bool>,
}

impl Default for StreamTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTracker {
    pub fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            opened: AtomicU64::new(0),
            closing: watch::channel(false).0,
        }
    }

    /// Count a new stream until the returned guard is dropped
    pub fn register(self: &Arc<Self>) -> StreamGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        StreamGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Streams opened since startup
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Ask every open stream response to end
    pub fn close_all(&self) {
        self.closing.send_replace(true);
    }

    /// Resolves once `close_all` has been called
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.closing.subscribe();
        async move {
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }
}

pub struct StreamGuard {
    tracker: Arc<StreamTracker>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_guards() {
        let tracker = Arc::new(StreamTracker::new());
        let a = tracker.register();
        let b = tracker.register();
        assert_eq!(tracker.active(), 2);

        drop(a);
        assert_eq!(tracker.active(), 1);
        drop(b);
        assert_eq!(tracker.active(), 0);
        assert_eq!(tracker.opened(), 2);
    }

    #[tokio::test]
    async fn test_close_all_resolves_waiters() {
        let tracker = StreamTracker::new();
        let closed = tracker.closed();
        tracker.close_all();
        closed.await;

        // Late subscribers see the flag immediately
        tracker.closed().await;
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::ClientGone.to_string(), "client disconnected");
        assert!(CloseReason::EncodeFailed("boom".into())
            .to_string()
            .ends_with("boom"));
    }
}
