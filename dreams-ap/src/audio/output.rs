//! Audio output using cpal
//!
//! Opens an output device and pulls frames from the [`SlotMixer`] in the
//! device callback, applying the master volume.

use super::mixer::SlotMixer;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Preferred device rate (clips are usually rendered at 44.1 kHz)
const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Shared master volume (0.0-1.0)
pub type SharedVolume = Arc<Mutex<f32>>;

pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    volume: SharedVolume,
}

impl AudioOutput {
    /// Names of the available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the named device (falling back to the default device)
    pub fn open(device_name: Option<&str>, volume: SharedVolume) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(dev) => {
                        info!("Using requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!("Requested device '{}' not found, falling back to default device", name);
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        let (config, sample_format) = Self::best_config(&device)?;
        info!(
            "Audio device: {} ({}Hz, {} channels, {:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            volume,
        })
    }

    /// Prefer 44.1 kHz stereo f32, otherwise the device default
    fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|c| {
            c.channels() == 2
                && c.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && c.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && c.sample_format() == SampleFormat::F32
        });

        if let Some(config) = preferred {
            let sample_format = config.sample_format();
            let config = config
                .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
                .config();
            return Ok((config, sample_format));
        }

        let default = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        Ok((default.config(), default.sample_format()))
    }

    /// Device sample rate; clips must be resampled to this before playback
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    /// Start pulling audio from `mixer`
    pub fn start(&mut self, mixer: Arc<SlotMixer>) -> Result<()> {
        if mixer.sample_rate() != self.sample_rate() {
            warn!(
                "Mixer rate {}Hz differs from device rate {}Hz",
                mixer.sample_rate(),
                self.sample_rate()
            );
        }

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(mixer)?,
            SampleFormat::I16 => self.build_stream::<i16>(mixer)?,
            SampleFormat::U16 => self.build_stream::<u16>(mixer)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        info!("Audio stream started");
        Ok(())
    }

    fn build_stream<T>(&self, mixer: Arc<SlotMixer>) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.config.channels as usize;
        let volume = Arc::clone(&self.volume);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let gain = match volume.lock() {
                        Ok(v) => *v,
                        Err(poisoned) => *poisoned.into_inner(),
                    };

                    let frame_count = data.len() / channels.max(1);
                    let mut frames = data.chunks_mut(channels.max(1));
                    mixer.render_into(frame_count, |[l, r]| {
                        if let Some(frame) = frames.next() {
                            write_frame(frame, l * gain, r * gain);
                        }
                    });
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Pause and drop the stream
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
            info!("Audio stream stopped");
        }
        Ok(())
    }
}

/// Write a stereo frame into a device frame of any channel count
fn write_frame<T: Sample + FromSample<f32>>(frame: &mut [T], left: f32, right: f32) {
    let left = left.clamp(-1.0, 1.0);
    let right = right.clamp(-1.0, 1.0);

    match frame.len() {
        0 => {}
        1 => frame[0] = T::from_sample((left + right) * 0.5),
        _ => {
            frame[0] = T::from_sample(left);
            frame[1] = T::from_sample(right);
            for extra in &mut frame[2..] {
                *extra = T::from_sample(0.0);
            }
        }
    }
}
