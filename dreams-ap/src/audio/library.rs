//! Decoded clip library
//!
//! Every catalog clip is decoded and resampled to the output rate up front.
//! A clip that fails to load is recorded with its reason; the rest of the
//! catalog still loads and the scheduler skips the broken clip.

use super::decoder::ClipDecoder;
use super::resampler::Resampler;
use dreams_common::{Catalog, Clip, ClipId, Error};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Decoded clip audio at the output rate (interleaved stereo)
#[derive(Debug)]
pub struct ClipBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl ClipBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stereo frame at `index`, silence past the end
    pub fn frame(&self, index: usize) -> [f32; 2] {
        let i = index * 2;
        match self.samples.get(i..i + 2) {
            Some(pair) => [pair[0], pair[1]],
            None => [0.0, 0.0],
        }
    }
}

/// Decoded buffers keyed by clip id, plus per-clip load failures
#[derive(Debug, Default)]
pub struct ClipLibrary {
    buffers: HashMap<ClipId, Arc<ClipBuffer>>,
    failures: HashMap<ClipId, String>,
    sample_rate: u32,
}

impl ClipLibrary {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    /// Decode every clip in `catalog` on blocking threads
    pub async fn load_all(catalog: &Catalog, audio_dir: &Path, sample_rate: u32) -> Self {
        let tasks = catalog.clips().iter().map(|clip| {
            let id = clip.id;
            let path = Catalog::asset_path(audio_dir, clip);
            async move {
                let result = tokio::task::spawn_blocking(move || load_clip(&path, sample_rate)).await;
                let result = match result {
                    Ok(inner) => inner,
                    Err(e) => Err(format!("Decode task failed: {}", e)),
                };
                (id, result)
            }
        });

        let mut library = Self::new(sample_rate);
        for (id, result) in futures::future::join_all(tasks).await {
            match result {
                Ok(buffer) => library.insert(id, buffer),
                Err(reason) => {
                    warn!("Clip {} unavailable: {}", id, reason);
                    library.mark_failed(id, reason);
                }
            }
        }

        info!(
            "Clip library ready: {} loaded, {} failed ({}Hz)",
            library.buffers.len(),
            library.failures.len(),
            sample_rate
        );
        library
    }

    pub fn insert(&mut self, id: ClipId, buffer: ClipBuffer) {
        self.failures.remove(&id);
        self.buffers.insert(id, Arc::new(buffer));
    }

    pub fn mark_failed(&mut self, id: ClipId, reason: impl Into<String>) {
        self.buffers.remove(&id);
        self.failures.insert(id, reason.into());
    }

    /// Buffer for `clip`, or `AssetUnavailable` with the load failure reason
    pub fn buffer_for(&self, clip: &Clip) -> dreams_common::Result<Arc<ClipBuffer>> {
        match self.buffers.get(&clip.id) {
            Some(buffer) => Ok(Arc::clone(buffer)),
            None => {
                let reason = self
                    .failures
                    .get(&clip.id)
                    .cloned()
                    .unwrap_or_else(|| "not loaded".to_string());
                Err(Error::asset_unavailable(clip.id, reason))
            }
        }
    }

    pub fn is_loaded(&self, id: ClipId) -> bool {
        self.buffers.contains_key(&id)
    }

    pub fn failure(&self, id: ClipId) -> Option<&str> {
        self.failures.get(&id).map(String::as_str)
    }

    pub fn loaded_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn load_clip(path: &Path, sample_rate: u32) -> std::result::Result<ClipBuffer, String> {
    let decoded = ClipDecoder::decode_file(path).map_err(|e| e.to_string())?;
    let samples = Resampler::resample(&decoded.samples, decoded.sample_rate, sample_rate, 2)
        .map_err(|e| e.to_string())?;
    Ok(ClipBuffer::new(samples, sample_rate))
}
