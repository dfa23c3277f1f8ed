//! Two-slot software mixer
//!
//! Each slot plays one decoded clip from its start with a gain ramp. The
//! output callback pulls frames; both slots are summed. A slot whose clip
//! has ended keeps producing silence until the scheduler stops it.
//!
//! Ramps are measured in output frames, so gain automation stays in step
//! with the audio actually rendered.

use super::library::{ClipBuffer, ClipLibrary};
use crate::scheduler::{Mixer, SlotIndex};
use dreams_common::{Clip, ClipId, FadeCurve, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Gain automation: `from` -> `to` over `length` frames starting at `start_frame`
#[derive(Debug, Clone, Copy)]
struct GainRamp {
    from: f32,
    to: f32,
    start_frame: u64,
    length: u64,
}

impl GainRamp {
    fn constant(gain: f32) -> Self {
        Self {
            from: gain,
            to: gain,
            start_frame: 0,
            length: 0,
        }
    }

    fn gain_at(&self, frame: u64, curve: FadeCurve) -> f32 {
        if self.length == 0 || frame >= self.start_frame + self.length {
            return self.to;
        }
        if frame <= self.start_frame {
            return self.from;
        }
        let position = (frame - self.start_frame) as f32 / self.length as f32;
        curve.interpolate(self.from, self.to, position)
    }
}

#[derive(Debug)]
struct Voice {
    clip: Option<ClipId>,
    buffer: Option<Arc<ClipBuffer>>,
    cursor: usize,
    ramp: GainRamp,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            clip: None,
            buffer: None,
            cursor: 0,
            ramp: GainRamp::constant(0.0),
        }
    }
}

#[derive(Debug, Default)]
struct MixerCore {
    voices: [Voice; 2],
    /// Frames rendered since the mixer was created
    clock: u64,
}

impl MixerCore {
    fn next_frame(&mut self, curve: FadeCurve) -> [f32; 2] {
        let clock = self.clock;
        let mut out = [0.0f32; 2];

        for voice in &mut self.voices {
            let Some(buffer) = &voice.buffer else {
                continue;
            };
            let gain = voice.ramp.gain_at(clock, curve);
            let [l, r] = buffer.frame(voice.cursor);
            out[0] += l * gain;
            out[1] += r * gain;
            voice.cursor += 1;
        }

        self.clock += 1;
        out
    }
}

/// Mixer backing the local player
pub struct SlotMixer {
    library: Arc<ClipLibrary>,
    curve: FadeCurve,
    sample_rate: u32,
    core: Mutex<MixerCore>,
}

impl SlotMixer {
    pub fn new(library: Arc<ClipLibrary>, curve: FadeCurve) -> Self {
        let sample_rate = library.sample_rate();
        Self {
            library,
            curve,
            sample_rate,
            core: Mutex::new(MixerCore::default()),
        }
    }

    pub fn library(&self) -> &Arc<ClipLibrary> {
        &self.library
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render one stereo frame
    pub fn render_frame(&self) -> [f32; 2] {
        self.lock().next_frame(self.curve)
    }

    /// Render `frames` stereo frames into `sink` under a single lock
    pub fn render_into<F: FnMut([f32; 2])>(&self, frames: usize, mut sink: F) {
        let mut core = self.lock();
        for _ in 0..frames {
            sink(core.next_frame(self.curve));
        }
    }

    /// Clip loaded on `slot`, if any
    pub fn loaded_clip(&self, slot: SlotIndex) -> Option<ClipId> {
        self.lock().voices[slot.index()].clip
    }

    fn lock(&self) -> MutexGuard<'_, MixerCore> {
        // A panic mid-render leaves only sample state behind; keep going
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn frames_for(&self, duration: Duration) -> u64 {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as u64
    }
}

impl Mixer for SlotMixer {
    fn start_clip(&self, slot: SlotIndex, clip: &Clip, gain: f32) -> Result<()> {
        let buffer = self.library.buffer_for(clip)?;
        debug!(
            "Slot {}: start clip {} ({} frames) at gain {:.2}",
            slot,
            clip.id,
            buffer.frames(),
            gain
        );

        let mut core = self.lock();
        core.voices[slot.index()] = Voice {
            clip: Some(clip.id),
            buffer: Some(buffer),
            cursor: 0,
            ramp: GainRamp::constant(gain),
        };
        Ok(())
    }

    fn ramp_gain(&self, slot: SlotIndex, from: f32, to: f32, duration: Duration) {
        let length = self.frames_for(duration);
        let mut core = self.lock();
        let start_frame = core.clock;
        core.voices[slot.index()].ramp = GainRamp {
            from,
            to,
            start_frame,
            length,
        };
    }

    fn stop_clip(&self, slot: SlotIndex) {
        debug!("Slot {}: stop", slot);
        self.lock().voices[slot.index()] = Voice::default();
    }

    fn current_gain(&self, slot: SlotIndex) -> f32 {
        let core = self.lock();
        let voice = &core.voices[slot.index()];
        if voice.buffer.is_none() {
            return 0.0;
        }
        voice.ramp.gain_at(core.clock, self.curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 100;

    fn mixer_with(clips: &[(u32, f32, usize)]) -> SlotMixer {
        let mut library = ClipLibrary::new(RATE);
        for (id, level, frames) in clips {
            library.insert(ClipId(*id), ClipBuffer::new(vec![*level; frames * 2], RATE));
        }
        SlotMixer::new(Arc::new(library), FadeCurve::Linear)
    }

    fn clip(id: u32) -> Clip {
        Clip::new(id, format!("clip {}", id), format!("{}.ogg", id))
    }

    #[test]
    fn test_idle_mixer_is_silent() {
        let mixer = mixer_with(&[]);
        assert_eq!(mixer.render_frame(), [0.0, 0.0]);
    }

    #[test]
    fn test_start_unloaded_clip_fails() {
        let mixer = mixer_with(&[]);
        let result = mixer.start_clip(SlotIndex::A, &clip(9), 0.0);
        assert!(matches!(result, Err(dreams_common::Error::AssetUnavailable { .. })));
        assert!(mixer.loaded_clip(SlotIndex::A).is_none());
    }

    #[test]
    fn test_linear_fade_in() {
        let mixer = mixer_with(&[(1, 1.0, 1000)]);
        mixer.start_clip(SlotIndex::A, &clip(1), 0.0).unwrap();
        mixer.ramp_gain(SlotIndex::A, 0.0, 1.0, Duration::from_secs(1));

        let mut frames = Vec::new();
        mixer.render_into(101, |f| frames.push(f[0]));

        assert_eq!(frames[0], 0.0);
        assert!((frames[50] - 0.5).abs() < 1e-6);
        assert_eq!(frames[100], 1.0);
        assert!((mixer.current_gain(SlotIndex::A) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_crossfade_sums_to_unity() {
        let mixer = mixer_with(&[(1, 1.0, 1000), (2, 1.0, 1000)]);
        mixer.start_clip(SlotIndex::A, &clip(1), 1.0).unwrap();
        mixer.start_clip(SlotIndex::B, &clip(2), 0.0).unwrap();
        mixer.ramp_gain(SlotIndex::A, 1.0, 0.0, Duration::from_secs(2));
        mixer.ramp_gain(SlotIndex::B, 0.0, 1.0, Duration::from_secs(2));

        mixer.render_into(200, |[l, _]| assert!((l - 1.0).abs() < 1e-5));
        assert!(mixer.current_gain(SlotIndex::A).abs() < 1e-6);
    }

    #[test]
    fn test_clip_end_is_silence() {
        let mixer = mixer_with(&[(1, 0.5, 3)]);
        mixer.start_clip(SlotIndex::A, &clip(1), 1.0).unwrap();

        let mut frames = Vec::new();
        mixer.render_into(5, |f| frames.push(f[0]));
        assert_eq!(frames, vec![0.5, 0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_stop_clip_unloads() {
        let mixer = mixer_with(&[(1, 1.0, 10)]);
        mixer.start_clip(SlotIndex::B, &clip(1), 1.0).unwrap();
        assert_eq!(mixer.loaded_clip(SlotIndex::B), Some(ClipId(1)));

        mixer.stop_clip(SlotIndex::B);
        assert!(mixer.loaded_clip(SlotIndex::B).is_none());
        assert_eq!(mixer.render_frame(), [0.0, 0.0]);
        assert_eq!(mixer.current_gain(SlotIndex::B), 0.0);
    }
}
