use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Raw audio batch as delivered by a microphone source (16-bit PCM, interleaved)
///
/// One chunk corresponds to one hardware callback, at the device's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Native sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioChunk {
    /// Number of sample frames (samples per channel) in this chunk
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// Item produced by a running source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A batch of captured samples
    Chunk(AudioChunk),
    /// The device failed after capture started (removed, permission revoked)
    Failed(CaptureError),
}

/// Constraints requested when acquiring the microphone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Preferred native sample rate; sources may ignore it
    pub sample_rate_hint: Option<u32>,
    /// Capacity of the source → processing-thread channel, in chunks
    pub channel_capacity: usize,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate_hint: Some(16000),
            channel_capacity: 64,
        }
    }
}

/// Microphone capability interface
///
/// Implementations:
/// - `FileSource`: replays a decoded audio file (testing/batch processing)
/// - `CpalSource`: default input device via cpal (feature `cpal-audio`)
#[async_trait::async_trait]
pub trait MicrophoneSource: Send + Sync {
    /// Acquire the device and start capturing
    ///
    /// Returns a channel receiver that will receive chunks until `stop` is
    /// called or the device fails. On error nothing is left open.
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<SourceEvent>, CaptureError>;

    /// Stop capturing and release the device (idempotent)
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}
