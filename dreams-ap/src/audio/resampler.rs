//! Audio resampling using rubato
//!
//! Clips are converted once, at load time, to the output device rate so the
//! mixer never has to resample in the audio callback.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Fallback output rate when no device rate is known
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`
    ///
    /// Returns a copy when the rates already match.
    pub fn resample(input: &[f32], input_rate: u32, output_rate: u32, channels: u16) -> Result<Vec<f32>> {
        if input_rate == output_rate {
            return Ok(input.to_vec());
        }
        if input.is_empty() || channels == 0 {
            return Ok(Vec::new());
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );

        let planar_input = deinterleave(input, channels);
        let input_frames = planar_input[0].len();

        // One chunk covering the whole clip
        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| Error::Resample(format!("Failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Resample(format!("Resampling failed: {}", e)))?;

        let output = interleave(&planar_output);
        debug!(
            "Resampled {} input frames to {} output frames",
            input_frames,
            output.len() / channels as usize
        );
        Ok(output)
    }
}

/// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let num_channels = channels as usize;
    let num_frames = samples.len() / num_channels;

    let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
    for frame in samples.chunks_exact(num_channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planar[ch].push(*sample);
        }
    }
    planar
}

/// [[L, L, ...], [R, R, ...]] -> [L, R, L, R, ...]
fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = planar.first() else {
        return Vec::new();
    };

    let num_frames = first.len();
    let mut interleaved = Vec::with_capacity(num_frames * planar.len());
    for frame_idx in 0..num_frames {
        for channel in planar {
            interleaved.push(channel[frame_idx]);
        }
    }
    interleaved
}
