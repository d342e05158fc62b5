// Sample-rate conversion to the 16 kHz rate expected by the voice models
//
// Nearest-neighbour selection: output sample i is input sample
// floor(i * source_rate / target_rate). No filtering is applied, which keeps
// the output length exactly floor(N * target / source) for the frame math.

use std::borrow::Cow;

use crate::error::CaptureError;

/// Sample rate required by the wake-word, VAD and STT models
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Nearest-neighbour resampler from a fixed source rate to a fixed target rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, CaptureError> {
        if source_rate == 0 || target_rate == 0 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "cannot resample {}Hz -> {}Hz",
                source_rate, target_rate
            )));
        }

        Ok(Self {
            source_rate,
            target_rate,
        })
    }

    /// Resampler from `source_rate` to the 16 kHz model rate
    pub fn to_target(source_rate: u32) -> Result<Self, CaptureError> {
        Self::new(source_rate, TARGET_SAMPLE_RATE)
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Number of output samples produced for `input_len` input samples
    pub fn output_len(&self, input_len: usize) -> usize {
        (input_len as u64 * self.target_rate as u64 / self.source_rate as u64) as usize
    }

    /// Resample one batch. Equal rates borrow the input unchanged.
    pub fn process<'a>(&self, input: &'a [i16]) -> Cow<'a, [i16]> {
        if self.source_rate == self.target_rate {
            return Cow::Borrowed(input);
        }

        let source = self.source_rate as u64;
        let target = self.target_rate as u64;
        let output: Vec<i16> = (0..self.output_len(input.len()) as u64)
            .map(|i| input[(i * source / target) as usize])
            .collect();

        Cow::Owned(output)
    }
}

/// Down-mix interleaved multi-channel samples to mono by averaging each frame
///
/// Mono input is borrowed unchanged. A trailing partial frame is dropped.
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Cow<'_, [i16]> {
    if channels <= 1 {
        return Cow::Borrowed(samples);
    }

    let mono = samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            let avg = sum / channels as i32;
            avg.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect();

    Cow::Owned(mono)
}
