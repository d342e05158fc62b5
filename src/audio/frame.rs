use super::resample::TARGET_SAMPLE_RATE;

/// Samples per frame consumed by voice-activity detection (32 ms at 16 kHz)
pub const FRAME_SAMPLES: usize = 512;

/// Size of one frame on the wire (little-endian i16)
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Fixed-length block of 16 kHz mono PCM samples
///
/// Only the `FrameAccumulator` produces frames; each one owns its samples.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Box<[i16; FRAME_SAMPLES]>,
}

impl AudioFrame {
    fn from_slice(samples: &[i16]) -> Self {
        let mut buf = Box::new([0i16; FRAME_SAMPLES]);
        buf.copy_from_slice(samples);
        Self { samples: buf }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples[..]
    }

    /// Duration of one frame in milliseconds
    pub fn duration_ms() -> u64 {
        (FRAME_SAMPLES as u64 * 1000) / TARGET_SAMPLE_RATE as u64
    }

    /// Raw little-endian PCM bytes, as sent to the voice server
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("len", &FRAME_SAMPLES)
            .field("first", &self.samples[0])
            .finish()
    }
}

/// Buffers resampled samples and emits fixed 512-sample frames
///
/// Samples that do not fill a whole frame are carried over to the next call,
/// so every input sample ends up in exactly one frame, in arrival order.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    carry: Vec<i16>,
    frames_emitted: u64,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            carry: Vec::with_capacity(FRAME_SAMPLES),
            frames_emitted: 0,
        }
    }

    /// Append a batch and return every frame it completes
    pub fn push(&mut self, samples: &[i16]) -> Vec<AudioFrame> {
        let mut frames = Vec::with_capacity((self.carry.len() + samples.len()) / FRAME_SAMPLES);
        self.push_with(samples, |frame| frames.push(frame));
        frames
    }

    /// Append a batch and hand each completed frame to `emit`, in order
    pub fn push_with(&mut self, samples: &[i16], mut emit: impl FnMut(AudioFrame)) {
        let mut rest = samples;

        // 1. Top up the carry-over first
        if !self.carry.is_empty() {
            let needed = FRAME_SAMPLES - self.carry.len();
            let take = needed.min(rest.len());
            self.carry.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.carry.len() < FRAME_SAMPLES {
                return;
            }

            emit(AudioFrame::from_slice(&self.carry));
            self.frames_emitted += 1;
            self.carry.clear();
        }

        // 2. Whole frames straight from the input
        let mut chunks = rest.chunks_exact(FRAME_SAMPLES);
        for chunk in &mut chunks {
            emit(AudioFrame::from_slice(chunk));
            self.frames_emitted += 1;
        }

        // 3. Tail becomes the new carry-over
        self.carry.extend_from_slice(chunks.remainder());
    }

    /// Number of samples waiting for the next frame (0..511)
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Samples waiting for the next frame
    pub fn carry(&self) -> &[i16] {
        &self.carry
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Drop the carry-over and reset counters
    pub fn reset(&mut self) {
        self.carry.clear();
        self.frames_emitted = 0;
    }
}
