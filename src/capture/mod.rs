//! Microphone capture session
//!
//! This module provides the `CaptureSession` abstraction that manages:
//! - Microphone acquisition through an injected `MicrophoneSource`
//! - A dedicated processing thread (down-mix, resample to 16 kHz, framing)
//! - Ordered delivery of 512-sample frames and device errors on a channel

mod session;
mod stats;

pub use session::{CaptureEvent, CaptureSession};
pub use stats::CaptureStats;
