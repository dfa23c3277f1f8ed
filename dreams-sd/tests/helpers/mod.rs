//! Test helpers for dreams-sd integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use dreams_common::events::EventBus;
use dreams_common::{Catalog, Clip, CrossfadeTiming, Error, FadeCurve, PlayCountStore, Result, Selector};
use dreams_sd::{SegmentEncoder, SegmentJob, SegmentOutcome, StreamSettings};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What the fake encoder does after writing a segment's single chunk
#[derive(Debug, Clone, Copy)]
pub enum FakeMode {
    /// Complete `n` segments, then report the client gone
    CompleteThenLeave(usize),
    /// Fail segment number `n` (1-based)
    FailAt(usize),
    /// Keep the segment open until the client disconnects
    HoldUntilClosed,
}

/// Encoder stand-in: one text chunk per segment, no subprocess
pub struct FakeEncoder {
    mode: FakeMode,
    jobs: Mutex<Vec<SegmentJob>>,
}

impl FakeEncoder {
    pub fn new(mode: FakeMode) -> Self {
        Self {
            mode,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn jobs(&self) -> Vec<SegmentJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SegmentEncoder for FakeEncoder {
    async fn encode(&self, job: &SegmentJob, sink: &mpsc::Sender<Bytes>) -> Result<SegmentOutcome> {
        let n = {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.push(job.clone());
            jobs.len()
        };

        let chunk = format!("segment {} {}->{}", n, job.current.id, job.next.id);
        if sink.send(Bytes::from(chunk)).await.is_err() {
            return Ok(SegmentOutcome::ClientGone);
        }

        match self.mode {
            FakeMode::CompleteThenLeave(limit) if n > limit => Ok(SegmentOutcome::ClientGone),
            FakeMode::CompleteThenLeave(_) => Ok(SegmentOutcome::Completed),
            FakeMode::FailAt(fail) if n == fail => Err(Error::Encode("fake encoder failure".to_string())),
            FakeMode::FailAt(_) => Ok(SegmentOutcome::Completed),
            FakeMode::HoldUntilClosed => {
                sink.closed().await;
                Ok(SegmentOutcome::ClientGone)
            }
        }
    }
}

/// Catalog with clips numbered 1..=n
pub fn numbered_catalog(n: u32) -> Catalog {
    let clips = (1..=n)
        .map(|id| Clip::new(id, format!("Chord {}", id), format!("{}.ogg", id)))
        .collect();
    Catalog::new(clips).unwrap()
}

pub async fn selector(n: u32, seed: u64) -> Arc<Selector> {
    let catalog = Arc::new(numbered_catalog(n));
    let counts = Arc::new(PlayCountStore::in_memory(&catalog).await);
    Arc::new(Selector::with_seed(catalog, counts, seed))
}

pub fn settings(audio_dir: impl Into<PathBuf>) -> StreamSettings {
    StreamSettings {
        audio_dir: audio_dir.into(),
        timing: CrossfadeTiming::default(),
        curve: FadeCurve::Linear,
    }
}

pub fn events() -> EventBus {
    EventBus::new(1000)
}
