use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Format details of a WAV speech clip
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub duration_secs: f64,
}

/// Synthesized speech received as one binary message
///
/// The payload is opaque to the session; when it is a RIFF/WAVE container
/// its format is read so the caller can schedule playback.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub bytes: Vec<u8>,
    pub format: Option<SpeechFormat>,
}

impl SpeechClip {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let format = inspect_wav(&bytes);

        match &format {
            Some(f) => debug!(
                "Speech clip: {} bytes, {}Hz, {:.2}s",
                bytes.len(),
                f.sample_rate,
                f.duration_secs
            ),
            None => debug!("Speech clip: {} bytes (not WAV)", bytes.len()),
        }

        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            bytes,
            format,
        }
    }

    pub fn is_wav(&self) -> bool {
        self.format.is_some()
    }

    /// File name used when spooling this clip
    pub fn file_name(&self) -> String {
        let ext = if self.is_wav() { "wav" } else { "bin" };
        format!("{}.{}", self.id, ext)
    }

    /// Write the clip into `dir` and return its path
    pub async fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, &self.bytes).await?;

        info!("Speech clip saved: {}", path.display());

        Ok(path)
    }
}

fn inspect_wav(bytes: &[u8]) -> Option<SpeechFormat> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    let frames = reader.duration();

    Some(SpeechFormat {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        duration_secs: frames as f64 / spec.sample_rate.max(1) as f64,
    })
}
