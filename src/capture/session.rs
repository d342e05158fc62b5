use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::stats::CaptureStats;
use crate::audio::{
    downmix_to_mono, AudioFrame, CaptureConstraints, FrameAccumulator, MicrophoneSource,
    Resampler, SourceEvent,
};
use crate::error::CaptureError;

/// How long `stop()` waits for the processing thread to exit
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Item delivered from the processing thread to the control flow
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// One 512-sample 16 kHz frame, in production order
    Frame(AudioFrame),
    /// The device failed after start; the processing path has shut down
    Error(CaptureError),
    /// The source ran out of audio (e.g. end of a replayed file)
    Ended,
}

#[derive(Debug, Default)]
struct Counters {
    chunks_received: AtomicU64,
    frames_emitted: AtomicU64,
    pending_samples: AtomicUsize,
}

/// One microphone acquisition plus its dedicated processing thread
///
/// Raw chunks from the source are down-mixed, resampled to 16 kHz and cut
/// into 512-sample frames on the `audio-processing` thread, so frame cadence
/// does not depend on how busy the control flow is.
pub struct CaptureSession {
    source: Box<dyn MicrophoneSource>,
    constraints: CaptureConstraints,
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl CaptureSession {
    pub fn new(source: Box<dyn MicrophoneSource>, constraints: CaptureConstraints) -> Self {
        Self {
            source,
            constraints,
            active: Arc::new(AtomicBool::new(false)),
            worker: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Acquire the microphone and start producing frames
    ///
    /// Returns the ordered event channel for this capture. On failure the
    /// source is released before the error is returned.
    pub async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::Device("capture session already active".to_string()));
        }

        info!("Starting capture from {}", self.source.name());

        let source_rx = self.source.start(&self.constraints).await?;

        // Fresh buffer for every session
        self.counters.chunks_received.store(0, Ordering::SeqCst);
        self.counters.frames_emitted.store(0, Ordering::SeqCst);
        self.counters.pending_samples.store(0, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::clone(&self.active);
        let counters = Arc::clone(&self.counters);
        active.store(true, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name("audio-processing".to_string())
            .spawn(move || process_loop(source_rx, tx, active, counters));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                info!("Capture session active");
                Ok(rx)
            }
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                if let Err(stop_err) = self.source.stop().await {
                    warn!("Failed to release source after spawn error: {}", stop_err);
                }
                Err(CaptureError::Device(format!(
                    "failed to spawn processing thread: {}",
                    e
                )))
            }
        }
    }

    /// Release the processing path and the device (idempotent)
    pub async fn stop(&mut self) -> Result<(), CaptureError> {
        let worker = self.worker.take();
        if worker.is_none() && !self.source.is_capturing() {
            return Ok(());
        }

        info!("Stopping capture from {}", self.source.name());
        self.active.store(false, Ordering::SeqCst);

        // Stopping the source closes its channel, which wakes the worker
        let result = self.source.stop().await;

        if let Some(handle) = worker {
            let join = tokio::task::spawn_blocking(move || handle.join());
            match tokio::time::timeout(WORKER_JOIN_TIMEOUT, join).await {
                Ok(Ok(Ok(()))) => debug!("Processing thread joined"),
                Ok(Ok(Err(_))) => error!("Processing thread panicked"),
                Ok(Err(e)) => error!("Failed to join processing thread: {}", e),
                Err(_) => warn!("Processing thread did not exit within {:?}", WORKER_JOIN_TIMEOUT),
            }
        }

        self.counters.pending_samples.store(0, Ordering::SeqCst);
        info!("Capture session stopped");

        result
    }

    /// True while the processing path is delivering frames
    pub fn is_active(&self) -> bool {
        self.worker.is_some() && self.active.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            active: self.is_active(),
            source: self.source.name().to_string(),
            chunks_received: self.counters.chunks_received.load(Ordering::SeqCst),
            frames_emitted: self.counters.frames_emitted.load(Ordering::SeqCst),
            pending_samples: self.counters.pending_samples.load(Ordering::SeqCst),
        }
    }
}

fn process_loop(
    mut source_rx: mpsc::Receiver<SourceEvent>,
    tx: mpsc::UnboundedSender<CaptureEvent>,
    active: Arc<AtomicBool>,
    counters: Arc<Counters>,
) {
    debug!("Audio processing thread started");

    let mut accumulator = FrameAccumulator::new();
    let mut resampler: Option<Resampler> = None;
    let mut ended = true;

    while let Some(event) = source_rx.blocking_recv() {
        if !active.load(Ordering::SeqCst) {
            ended = false;
            break;
        }

        match event {
            SourceEvent::Chunk(chunk) => {
                counters.chunks_received.fetch_add(1, Ordering::Relaxed);

                let current = match resampler {
                    Some(r) if r.source_rate() == chunk.sample_rate => r,
                    _ => match Resampler::to_target(chunk.sample_rate) {
                        Ok(r) => {
                            debug!("Resampling {}Hz -> {}Hz", r.source_rate(), r.target_rate());
                            resampler = Some(r);
                            r
                        }
                        Err(e) => {
                            error!("Cannot process capture: {}", e);
                            let _ = tx.send(CaptureEvent::Error(e));
                            ended = false;
                            break;
                        }
                    },
                };

                let mono = downmix_to_mono(&chunk.samples, chunk.channels);
                let resampled = current.process(&mono);
                accumulator.push_with(&resampled, |frame| {
                    counters.frames_emitted.fetch_add(1, Ordering::Relaxed);
                    let _ = tx.send(CaptureEvent::Frame(frame));
                });
                counters
                    .pending_samples
                    .store(accumulator.pending(), Ordering::Relaxed);
            }
            SourceEvent::Failed(e) => {
                error!("Capture device failed: {}", e);
                let _ = tx.send(CaptureEvent::Error(e));
                ended = false;
                break;
            }
        }
    }

    if ended && active.load(Ordering::SeqCst) {
        info!("Capture source ended");
        let _ = tx.send(CaptureEvent::Ended);
    }

    active.store(false, Ordering::SeqCst);
    debug!(
        "Audio processing thread exiting ({} samples left in carry-over)",
        accumulator.pending()
    );
}
