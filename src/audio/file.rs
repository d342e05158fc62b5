use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::resample::downmix_to_mono;
use super::source::{AudioChunk, CaptureConstraints, MicrophoneSource, SourceEvent};
use crate::error::CaptureError;

/// Samples per chunk when replaying a file (a typical hardware callback)
pub const DEFAULT_CHUNK_SAMPLES: usize = 4096;

/// A fully decoded, mono audio file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    /// Channel count of the original file (samples are already mono)
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Decode any container/codec symphonia understands and down-mix to mono
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let file = File::open(path).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| CaptureError::UnsupportedFormat(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CaptureError::UnsupportedFormat("no audio track".to_string()))?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| CaptureError::UnsupportedFormat("unknown sample rate".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| CaptureError::UnsupportedFormat(e.to_string()))?;

        let mut channels: u16 = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1);
        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(CaptureError::Device(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(CaptureError::Device(e.to_string())),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count() as u16;
            let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(&downmix_to_mono(buf.samples(), channels));
        }

        let duration_seconds = samples.len() as f64 / sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            sample_rate,
            channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate,
            channels,
            samples,
        })
    }
}

/// Replays an audio file as if it were a microphone
///
/// The file is decoded when capture starts, so a missing file surfaces as
/// `DeviceUnavailable` from `start()` like an absent device would.
pub struct FileSource {
    path: PathBuf,
    chunk_samples: usize,
    realtime: bool,
    task: Option<JoinHandle<()>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            realtime: true,
            task: None,
        }
    }

    /// Number of samples per emitted chunk
    pub fn with_chunk_samples(mut self, chunk_samples: usize) -> Self {
        self.chunk_samples = chunk_samples.max(1);
        self
    }

    /// Pace chunks at the file's real-time rate (default), or emit as fast as
    /// the consumer accepts them
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

#[async_trait::async_trait]
impl MicrophoneSource for FileSource {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<SourceEvent>, CaptureError> {
        if self.task.is_some() {
            return Err(CaptureError::Device("already capturing".to_string()));
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| CaptureError::Device(format!("decoder task failed: {}", e)))??;

        debug!(
            "Replaying {} (echo_cancellation={}, noise_suppression={}, auto_gain={} are not applied to files)",
            audio.path,
            constraints.echo_cancellation,
            constraints.noise_suppression,
            constraints.auto_gain_control
        );

        let (tx, rx) = mpsc::channel(constraints.channel_capacity.max(1));
        let chunk_samples = self.chunk_samples;
        let realtime = self.realtime;

        let task = tokio::spawn(async move {
            let chunk_duration =
                Duration::from_secs_f64(chunk_samples as f64 / audio.sample_rate as f64);
            let mut interval = tokio::time::interval(chunk_duration);

            for (index, samples) in audio.samples.chunks(chunk_samples).enumerate() {
                if realtime {
                    interval.tick().await;
                }

                let chunk = AudioChunk {
                    samples: samples.to_vec(),
                    sample_rate: audio.sample_rate,
                    channels: 1,
                    timestamp_ms: (index * chunk_samples) as u64 * 1000
                        / audio.sample_rate as u64,
                };

                if tx.send(SourceEvent::Chunk(chunk)).await.is_err() {
                    debug!("Replay consumer went away");
                    return;
                }
            }

            info!("Replay of {} finished", audio.path);
        });

        self.task = Some(task);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File replay stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "file replay"
    }
}
