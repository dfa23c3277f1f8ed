//! Audio decoder using symphonia
//!
//! Decodes a whole clip file (Ogg/Vorbis, MP3, FLAC, WAV, AAC) to interleaved
//! stereo f32. Clips are short, so each one is decoded fully into memory.

use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Fully decoded clip audio
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved stereo samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

pub struct ClipDecoder;

impl ClipDecoder {
    /// Decode an entire audio file to interleaved stereo f32
    ///
    /// Mono sources are duplicated to both channels; sources with more than
    /// two channels keep their first two.
    pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
        debug!("Decoding clip file: {}", path.display());

        let file = std::fs::File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Decoder reset required in {}, stopping early", path.display());
                    break;
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Error reading packet: {}", e)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet: skip it, keep the rest of the clip
                    warn!("Decode error in {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();

            let buf = sample_buf.get_or_insert_with(|| {
                SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
            });
            if buf.capacity() < decoded.capacity() * channels {
                *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            }
            buf.copy_interleaved_ref(decoded);

            append_as_stereo(buf.samples(), channels, &mut samples);
        }

        if samples.is_empty() {
            return Err(Error::Decode(format!("No audio decoded from {}", path.display())));
        }

        let audio = DecodedAudio { samples, sample_rate };
        debug!(
            "Decoded {} frames at {}Hz ({:.2}s)",
            audio.frames(),
            sample_rate,
            audio.duration_secs()
        );
        Ok(audio)
    }
}

/// Append interleaved `input` with `channels` channels as stereo
fn append_as_stereo(input: &[f32], channels: usize, output: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            output.reserve(input.len() * 2);
            for sample in input {
                output.push(*sample);
                output.push(*sample);
            }
        }
        2 => output.extend_from_slice(input),
        n => {
            output.reserve(input.len() / n * 2);
            for frame in input.chunks_exact(n) {
                output.push(frame[0]);
                output.push(frame[1]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_to_stereo() {
        let mut out = Vec::new();
        append_as_stereo(&[0.1, 0.2, 0.3], 1, &mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_append_keeps_previous_packets() {
        let mut out = vec![0.5, 0.5];
        append_as_stereo(&[0.1, 0.2], 1, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_surround_downmix_takes_front_pair() {
        let mut out = Vec::new();
        append_as_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_missing_file() {
        let result = ClipDecoder::decode_file(Path::new("/nonexistent/1 Am.ogg"));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.ogg");
        std::fs::write(&path, b"definitely not an ogg stream").unwrap();

        assert!(ClipDecoder::decode_file(&path).is_err());
    }
}
