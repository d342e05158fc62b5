pub mod file;
pub mod frame;
pub mod resample;
pub mod source;

#[cfg(feature = "cpal-audio")]
pub mod microphone;

pub use file::{AudioFile, FileSource};
pub use frame::{AudioFrame, FrameAccumulator, FRAME_BYTES, FRAME_SAMPLES};
pub use resample::{downmix_to_mono, Resampler, TARGET_SAMPLE_RATE};
pub use source::{AudioChunk, CaptureConstraints, MicrophoneSource, SourceEvent};

#[cfg(feature = "cpal-audio")]
pub use microphone::CpalSource;
