use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::CaptureConstraints;
use crate::client::ClientConfig;
use crate::voice::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub speech: SpeechConfig,
    pub interaction: InteractionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-client".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3100,
        }
    }
}

/// Voice server connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            url: session.url,
            outbound_queue: session.outbound_queue,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Preferred device rate; the pipeline resamples whatever it gets
    pub sample_rate_hint: Option<u32>,
    /// Raw chunks buffered between the device and the processing thread
    pub channel_capacity: usize,
    /// Samples per chunk when replaying a file
    pub file_chunk_samples: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let constraints = CaptureConstraints::default();
        Self {
            echo_cancellation: constraints.echo_cancellation,
            noise_suppression: constraints.noise_suppression,
            auto_gain_control: constraints.auto_gain_control,
            sample_rate_hint: constraints.sample_rate_hint,
            channel_capacity: constraints.channel_capacity,
            file_chunk_samples: crate::audio::file::DEFAULT_CHUNK_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Directory received speech clips are written to (`~` is expanded)
    pub spool_dir: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            spool_dir: "~/.voice-client/speech".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Delay before a push-to-talk `complete` reverts to `idle`
    pub revert_after_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            revert_after_ms: 1500,
        }
    }
}

impl Config {
    /// Load `path` (extension optional) with `VOICE_CLIENT__*` overrides
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_CLIENT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path))
    }

    pub fn speech_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.speech.spool_dir).into_owned())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            session: SessionConfig {
                url: self.server.url.clone(),
                outbound_queue: self.server.outbound_queue,
            },
            constraints: CaptureConstraints {
                echo_cancellation: self.audio.echo_cancellation,
                noise_suppression: self.audio.noise_suppression,
                auto_gain_control: self.audio.auto_gain_control,
                sample_rate_hint: self.audio.sample_rate_hint,
                channel_capacity: self.audio.channel_capacity,
            },
            speech_dir: self.speech_dir(),
            revert_after: Duration::from_millis(self.interaction.revert_after_ms),
        }
    }
}
