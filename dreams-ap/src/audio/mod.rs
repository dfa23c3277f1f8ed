//! Audio pipeline: decode, resample, mix, output

pub mod decoder;
pub mod library;
pub mod mixer;
pub mod output;
pub mod resampler;

pub use decoder::{ClipDecoder, DecodedAudio};
pub use library::{ClipBuffer, ClipLibrary};
pub use mixer::SlotMixer;
pub use output::{AudioOutput, SharedVolume};
pub use resampler::Resampler;
