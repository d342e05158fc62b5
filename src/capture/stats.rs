use serde::{Deserialize, Serialize};

/// Statistics about the current capture session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Whether the processing path is delivering frames
    pub active: bool,

    /// Name of the microphone source
    pub source: String,

    /// Raw chunks received from the source
    pub chunks_received: u64,

    /// 512-sample frames produced
    pub frames_emitted: u64,

    /// Samples waiting in the carry-over buffer
    pub pending_samples: usize,
}
