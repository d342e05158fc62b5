// Microphone source backed by cpal (default input device)
//
// cpal streams are not Send, so each capture owns a dedicated device thread
// that builds the stream, plays it, and drops it when asked to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, Device, PlayStreamError, SampleFormat, SampleRate,
    SizedSample, Stream, StreamConfig, StreamError,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::source::{AudioChunk, CaptureConstraints, MicrophoneSource, SourceEvent};
use crate::error::CaptureError;

/// Captures from the host's default input device
pub struct CpalSource {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalSource {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl Default for CpalSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MicrophoneSource for CpalSource {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<SourceEvent>, CaptureError> {
        if self.thread.is_some() {
            return Err(CaptureError::Device("already capturing".to_string()));
        }

        if constraints.echo_cancellation
            || constraints.noise_suppression
            || constraints.auto_gain_control
        {
            debug!("Echo cancellation, noise suppression and gain control are left to the host");
        }

        let (tx, rx) = mpsc::channel(constraints.channel_capacity.max(1));
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<u32, CaptureError>>(1);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);
        let hint = constraints.sample_rate_hint;

        let handle = thread::Builder::new()
            .name("cpal-input".to_string())
            .spawn(move || {
                let (stream, rate) = match open_stream(hint, tx) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(map_play_error(e)));
                    return;
                }
                let _ = ready_tx.send(Ok(rate));

                while running.load(Ordering::SeqCst) {
                    thread::park_timeout(Duration::from_millis(100));
                }

                drop(stream);
                debug!("cpal input stream dropped");
            })
            .map_err(|e| CaptureError::Device(format!("failed to spawn device thread: {}", e)))?;

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        match ready {
            Ok(Ok(rate)) => {
                info!("Microphone capture started at {}Hz", rate);
                self.thread = Some(handle);
                Ok(rx)
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::Device("device thread exited during start".to_string()))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        self.running.store(false, Ordering::SeqCst);
        handle.thread().unpark();
        tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| CaptureError::Device(e.to_string()))?
            .map_err(|_| CaptureError::Device("device thread panicked".to_string()))?;

        info!("Microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some() && self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal default input"
    }
}

fn open_stream(
    hint: Option<u32>,
    tx: mpsc::Sender<SourceEvent>,
) -> Result<(Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("no input device available".to_string()))?;

    let default_config = device.default_input_config().map_err(map_config_error)?;
    let sample_format = default_config.sample_format();

    let supported = hint
        .and_then(|rate| {
            device.supported_input_configs().ok()?.find(|c| {
                c.sample_format() == sample_format
                    && c.min_sample_rate() <= SampleRate(rate)
                    && c.max_sample_rate() >= SampleRate(rate)
            })
            .map(|c| c.with_sample_rate(SampleRate(rate)))
        })
        .unwrap_or(default_config);

    let config = supported.config();
    info!(
        "Opening {} ({}Hz, {} channels, {:?})",
        device.name().unwrap_or_default(),
        config.sample_rate.0,
        config.channels,
        sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, tx, |s| {
            (s * 32767.0).clamp(-32768.0, 32767.0) as i16
        })?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, tx, |s| s)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, tx, |s| {
            (s as i32 - 32768) as i16
        })?,
        other => {
            return Err(CaptureError::UnsupportedFormat(format!(
                "sample format {:?}",
                other
            )))
        }
    };

    Ok((stream, config.sample_rate.0))
}

fn build_stream<T: SizedSample>(
    device: &Device,
    config: &StreamConfig,
    tx: mpsc::Sender<SourceEvent>,
    convert: fn(T) -> i16,
) -> Result<Stream, CaptureError> {
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let started = Instant::now();
    let err_tx = tx.clone();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk = AudioChunk {
                    samples: data.iter().map(|&s| convert(s)).collect(),
                    sample_rate,
                    channels,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                if let Err(mpsc::error::TrySendError::Full(_)) =
                    tx.try_send(SourceEvent::Chunk(chunk))
                {
                    warn!("Processing path is behind, dropping input chunk");
                }
            },
            move |err| {
                error!("Audio capture error: {}", err);
                let _ = err_tx.try_send(SourceEvent::Failed(map_stream_error(err)));
            },
            None,
        )
        .map_err(map_build_error)
}

fn backend_error(description: String) -> CaptureError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Device(description)
    }
}

fn map_config_error(err: DefaultStreamConfigError) -> CaptureError {
    match err {
        DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("input device not available".to_string())
        }
        DefaultStreamConfigError::StreamTypeNotSupported => {
            CaptureError::UnsupportedFormat("device does not support input".to_string())
        }
        DefaultStreamConfigError::BackendSpecific { err } => backend_error(err.description),
        #[allow(unreachable_patterns)]
        other => CaptureError::Device(other.to_string()),
    }
}

fn map_build_error(err: BuildStreamError) -> CaptureError {
    match err {
        BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("input device not available".to_string())
        }
        BuildStreamError::StreamConfigNotSupported => {
            CaptureError::UnsupportedFormat("stream config not supported".to_string())
        }
        BuildStreamError::BackendSpecific { err } => backend_error(err.description),
        other => CaptureError::Device(other.to_string()),
    }
}

fn map_play_error(err: PlayStreamError) -> CaptureError {
    match err {
        PlayStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("input device not available".to_string())
        }
        PlayStreamError::BackendSpecific { err } => backend_error(err.description),
        #[allow(unreachable_patterns)]
        other => CaptureError::Device(other.to_string()),
    }
}

fn map_stream_error(err: StreamError) -> CaptureError {
    match err {
        StreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("input device removed".to_string())
        }
        StreamError::BackendSpecific { err } => backend_error(err.description),
        #[allow(unreachable_patterns)]
        other => CaptureError::Device(other.to_string()),
    }
}
