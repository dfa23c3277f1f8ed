//! Stream session tests with a fake segment encoder

mod helpers;

use dreams_common::events::DreamsEvent;
use dreams_sd::{CloseReason, FfmpegEncoder, StreamSession};
use helpers::{events, selector, settings, FakeEncoder, FakeMode};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_segments_chain_current_to_next() {
    let selector = selector(5, 1).await;
    let encoder = Arc::new(FakeEncoder::new(FakeMode::CompleteThenLeave(3)));
    let bus = events();
    let mut rx_events = bus.subscribe();

    let session = StreamSession::new(
        Arc::clone(&selector),
        Arc::clone(&encoder),
        settings("/audio"),
        bus,
    );
    let stream_id = session.id();
    let (tx, mut rx) = mpsc::channel(64);
    let summary = session.run(tx).await;

    assert_eq!(summary.stream_id, stream_id);
    assert_eq!(summary.segments, 3);
    assert_eq!(summary.reason, CloseReason::ClientGone);

    let jobs = encoder.jobs();
    assert_eq!(jobs.len(), 4);
    assert_eq!(jobs[0].directive.lead_in_s, 0.0);
    for job in &jobs[1..] {
        assert_eq!(job.directive.lead_in_s, 12.0);
        assert_eq!(job.directive.segment_duration_s(), 25.0);
    }
    for job in &jobs {
        assert_ne!(job.current.id, job.next.id);
    }
    for pair in jobs.windows(2) {
        assert_eq!(pair[0].next, pair[1].current, "next clip becomes current");
    }

    // First and second clip, then one new clip per completed segment
    assert_eq!(selector.play_counts().total().await, 5);

    let mut chunks = 0;
    while rx.try_recv().is_ok() {
        chunks += 1;
    }
    assert_eq!(chunks, 4);

    let mut kinds = Vec::new();
    while let Ok(event) = rx_events.try_recv() {
        if let DreamsEvent::StreamClosed { segments, .. } = &event {
            assert_eq!(*segments, 3);
        }
        kinds.push(event.event_type());
    }
    assert_eq!(kinds.first(), Some(&"StreamOpened"));
    assert_eq!(kinds.last(), Some(&"StreamClosed"));
    assert_eq!(kinds.iter().filter(|k| **k == "StreamSegment").count(), 4);
}

#[tokio::test]
async fn test_job_paths_resolve_against_audio_dir() {
    let selector = selector(3, 2).await;
    let encoder = Arc::new(FakeEncoder::new(FakeMode::CompleteThenLeave(0)));
    let session = StreamSession::new(selector, Arc::clone(&encoder), settings("/srv/audio"), events());

    let (tx, _rx) = mpsc::channel(8);
    session.run(tx).await;

    let job = &encoder.jobs()[0];
    assert_eq!(
        job.current_path,
        std::path::Path::new("/srv/audio").join(&job.current.asset)
    );
    assert_eq!(
        job.next_path,
        std::path::Path::new("/srv/audio").join(&job.next.asset)
    );
}

#[tokio::test]
async fn test_encode_failure_ends_only_that_stream() {
    let selector = selector(5, 3).await;
    let failing = Arc::new(FakeEncoder::new(FakeMode::FailAt(1)));
    let healthy = Arc::new(FakeEncoder::new(FakeMode::CompleteThenLeave(2)));

    let (tx_a, _rx_a) = mpsc::channel(64);
    let (tx_b, _rx_b) = mpsc::channel(64);
    let a = StreamSession::new(Arc::clone(&selector), failing, settings("/audio"), events());
    let b = StreamSession::new(Arc::clone(&selector), healthy, settings("/audio"), events());

    let (summary_a, summary_b) = tokio::join!(a.run(tx_a), b.run(tx_b));

    assert_eq!(summary_a.segments, 0);
    assert!(matches!(summary_a.reason, CloseReason::EncodeFailed(ref msg) if msg.contains("fake encoder failure")));
    assert_eq!(summary_b.segments, 2);
    assert_eq!(summary_b.reason, CloseReason::ClientGone);
    assert_ne!(summary_a.stream_id, summary_b.stream_id);
}

#[tokio::test]
async fn test_single_clip_catalog_closes_without_encoding() {
    let selector = selector(1, 4).await;
    let encoder = Arc::new(FakeEncoder::new(FakeMode::CompleteThenLeave(10)));
    let session = StreamSession::new(Arc::clone(&selector), Arc::clone(&encoder), settings("/audio"), events());

    let (tx, _rx) = mpsc::channel(8);
    let summary = session.run(tx).await;

    assert!(matches!(summary.reason, CloseReason::NoClip(_)));
    assert!(encoder.jobs().is_empty());
    assert_eq!(selector.play_counts().total().await, 1);
}

#[tokio::test]
async fn test_disconnected_client_stops_before_encoding() {
    let selector = selector(4, 5).await;
    let encoder = Arc::new(FakeEncoder::new(FakeMode::CompleteThenLeave(10)));
    let session = StreamSession::new(selector, Arc::clone(&encoder), settings("/audio"), events());

    let (tx, rx) = mpsc::channel(8);
    drop(rx);
    let summary = session.run(tx).await;

    assert_eq!(summary.reason, CloseReason::ClientGone);
    assert_eq!(summary.segments, 0);
    assert!(encoder.jobs().is_empty());
}

#[tokio::test]
async fn test_missing_asset_reports_clip_unavailable() {
    let empty = TempDir::new().unwrap();
    let selector = selector(3, 6).await;
    let bus = events();
    let mut rx_events = bus.subscribe();
    let session = StreamSession::new(
        selector,
        Arc::new(FfmpegEncoder::default()),
        settings(empty.path()),
        bus,
    );

    let (tx, _rx) = mpsc::channel(8);
    let summary = session.run(tx).await;

    assert!(matches!(summary.reason, CloseReason::EncodeFailed(_)));

    let mut unavailable = 0;
    while let Ok(event) = rx_events.try_recv() {
        if matches!(event, DreamsEvent::ClipUnavailable { .. }) {
            unavailable += 1;
        }
    }
    assert_eq!(unavailable, 1);
}
