use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{AudioFrame, CaptureConstraints, MicrophoneSource};
use crate::capture::{CaptureEvent, CaptureSession, CaptureStats};
use crate::error::{CaptureError, ClientError};
use crate::interaction::{
    InteractionState, InteractionTracker, LocalRecordingState, VoiceMode, DEFAULT_REVERT_AFTER,
};
use crate::voice::{
    ConnectionState, ControlMessage, DuplexByteConnection, SessionConfig, SessionEvent,
    SessionStats, SessionUpdate, Song, SpeechClip, SpeechFormat, VoiceSessionClient,
};

/// Creates a fresh microphone source for every capture session
pub type SourceFactory = Box<dyn Fn() -> Box<dyn MicrophoneSource> + Send + Sync>;

/// Settings for a `VoiceClient`
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub session: SessionConfig,
    pub constraints: CaptureConstraints,
    /// Where received speech clips are written
    pub speech_dir: PathBuf,
    /// Delay before a push-to-talk `complete` reverts to `idle`
    pub revert_after: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            constraints: CaptureConstraints::default(),
            speech_dir: std::env::temp_dir().join("voice-client").join("speech"),
            revert_after: DEFAULT_REVERT_AFTER,
        }
    }
}

/// Notification for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Transcript(String),
    Response(Option<String>),
    Songs {
        summary: Option<String>,
        songs: Vec<Song>,
    },
    /// A speech clip was spooled and can be played
    SpeechReady {
        path: PathBuf,
        format: Option<SpeechFormat>,
    },
    Interaction(InteractionState),
    Connection(ConnectionState),
    /// Continuous voice mode ended without the user asking for it
    VoiceModeExited {
        message: Option<String>,
    },
    Error(String),
}

/// Snapshot of the whole client
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub client_id: Uuid,
    pub connection: ConnectionState,
    pub interaction: InteractionState,
    pub mode: VoiceMode,
    pub local_recording: LocalRecordingState,
    pub server_ready: bool,
    pub capture: Option<CaptureStats>,
    pub session: SessionStats,
}

#[derive(Default)]
struct CaptureSlot {
    session: Option<CaptureSession>,
    /// Bumped on every start; a forwarder only tears down its own capture
    epoch: u64,
}

struct ClientInner {
    client_id: Uuid,
    session: VoiceSessionClient,
    tracker: InteractionTracker,
    source_factory: SourceFactory,
    constraints: CaptureConstraints,
    speech_dir: PathBuf,
    capture: Mutex<CaptureSlot>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

/// UI-facing voice client
///
/// Binds one capture session, one voice session and the interaction tracker.
/// Capture and session are cancelled independently: stopping capture leaves
/// the connection open and disconnecting leaves the microphone alone. The
/// exceptions are failures: a connection error falls back to push-to-talk
/// and stops the capture stream, a capture error exits voice mode.
pub struct VoiceClient {
    inner: Arc<ClientInner>,
    pumps: Vec<JoinHandle<()>>,
}

impl VoiceClient {
    /// Create a client and the channel its events arrive on
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        config: ClientConfig,
        connection: Arc<dyn DuplexByteConnection>,
        source_factory: SourceFactory,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (session, updates) = VoiceSessionClient::new(config.session, connection);
        let tracker = InteractionTracker::new(config.revert_after);
        let interaction_rx = tracker.subscribe();

        let inner = Arc::new(ClientInner {
            client_id: Uuid::new_v4(),
            session,
            tracker,
            source_factory,
            constraints: config.constraints,
            speech_dir: config.speech_dir,
            capture: Mutex::new(CaptureSlot::default()),
            events,
        });

        info!("Voice client {} created", inner.client_id);

        let pumps = vec![
            tokio::spawn(run_session_pump(Arc::clone(&inner), updates)),
            tokio::spawn(run_interaction_pump(Arc::clone(&inner), interaction_rx)),
        ];

        (Self { inner, pumps }, events_rx)
    }

    pub fn client_id(&self) -> Uuid {
        self.inner.client_id
    }

    /// Open the microphone and stream frames to the voice session
    ///
    /// A warned no-op while a capture is already active.
    pub async fn start_capture(&self) -> Result<(), ClientError> {
        self.inner.start_capture().await
    }

    /// Release the microphone (idempotent); the connection stays open
    pub async fn stop_capture(&self) -> Result<(), ClientError> {
        self.inner.stop_capture(None).await?;
        Ok(())
    }

    pub async fn is_capturing(&self) -> bool {
        let slot = self.inner.capture.lock().await;
        slot.session.as_ref().is_some_and(CaptureSession::is_active)
    }

    pub fn connect(&self) {
        self.inner.session.connect();
    }

    /// Close the connection (idempotent); capture is left running
    pub fn disconnect(&self) {
        self.inner.session.disconnect();
        self.inner.tracker.on_disconnected();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.session.state()
    }

    /// Send one frame; false when it was dropped
    pub fn send_audio(&self, frame: &AudioFrame) -> bool {
        self.inner.session.send_audio_frame(frame)
    }

    /// Send a structured message to the server
    pub fn send_message<M: Serialize>(&self, message: &M) -> Result<bool, ClientError> {
        if self.inner.session.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        Ok(self.inner.session.send_control_message(message)?)
    }

    /// Tell the server the last speech clip finished playing
    pub fn playback_finished(&self) -> Result<bool, ClientError> {
        debug!("Speech playback finished");
        self.send_message(&ControlMessage::TtsComplete)
    }

    /// Enter continuous voice mode: connect and stream the microphone
    pub async fn start_voice_mode(&self) -> Result<(), ClientError> {
        info!("Starting voice mode");
        self.inner.tracker.set_mode(VoiceMode::Continuous);
        self.inner.session.connect();

        if let Err(e) = self.inner.start_capture().await {
            error!("Voice mode could not open the microphone: {}", e);
            self.inner.tracker.set_mode(VoiceMode::PushToTalk);
            return Err(e);
        }

        Ok(())
    }

    /// Leave continuous voice mode and release the microphone
    pub async fn stop_voice_mode(&self) -> Result<(), ClientError> {
        info!("Stopping voice mode");
        self.inner.tracker.set_mode(VoiceMode::PushToTalk);
        self.inner.stop_capture(None).await?;
        Ok(())
    }

    pub fn voice_mode(&self) -> VoiceMode {
        self.inner.tracker.mode()
    }

    /// Report push-to-talk recording activity
    pub fn set_local_recording(
        &self,
        state: LocalRecordingState,
        result_ready: bool,
    ) -> InteractionState {
        self.inner.tracker.set_local_recording(state, result_ready)
    }

    pub fn interaction_state(&self) -> InteractionState {
        self.inner.tracker.state()
    }

    pub fn subscribe_interaction(&self) -> watch::Receiver<InteractionState> {
        self.inner.tracker.subscribe()
    }

    pub async fn status(&self) -> ClientStatus {
        let capture = {
            let slot = self.inner.capture.lock().await;
            slot.session.as_ref().map(CaptureSession::stats)
        };
        let tracker = &self.inner.tracker;

        ClientStatus {
            client_id: self.inner.client_id,
            connection: self.inner.session.state(),
            interaction: tracker.state(),
            mode: tracker.mode(),
            local_recording: tracker.local_recording(),
            server_ready: tracker.is_server_ready(),
            capture,
            session: self.inner.session.stats(),
        }
    }

    /// Release the microphone and close the connection
    pub async fn shutdown(&self) {
        if let Err(e) = self.inner.stop_capture(None).await {
            warn!("Error while stopping capture: {}", e);
        }
        self.disconnect();
    }
}

impl Drop for VoiceClient {
    fn drop(&mut self) {
        self.inner.session.disconnect();
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

impl ClientInner {
    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    async fn start_capture(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut slot = self.capture.lock().await;

        if slot.session.as_ref().is_some_and(CaptureSession::is_active) {
            warn!("Capture already active");
            return Ok(());
        }

        // A capture that ended on its own still holds its source
        if let Some(mut finished) = slot.session.take() {
            if let Err(e) = finished.stop().await {
                warn!("Error while releasing finished capture: {}", e);
            }
        }

        let mut capture = CaptureSession::new((self.source_factory)(), self.constraints.clone());
        let frames = capture.start().await?;

        slot.epoch += 1;
        slot.session = Some(capture);

        tokio::spawn(run_capture_forwarder(Arc::clone(self), frames, slot.epoch));

        Ok(())
    }

    /// Stop the current capture; with `epoch` set, only if it is still the
    /// capture that epoch started
    async fn stop_capture(&self, epoch: Option<u64>) -> Result<(), CaptureError> {
        let mut slot = self.capture.lock().await;
        if epoch.is_some_and(|e| e != slot.epoch) {
            return Ok(());
        }

        match slot.session.take() {
            Some(mut capture) => capture.stop().await,
            None => Ok(()),
        }
    }

    /// Leave continuous mode after a failure and tell the presentation layer
    fn exit_voice_mode(&self, message: Option<String>) {
        if self.tracker.mode() == VoiceMode::Continuous {
            self.tracker.set_mode(VoiceMode::PushToTalk);
            self.emit(ClientEvent::VoiceModeExited { message });
        }
    }

    async fn handle_update(&self, update: SessionUpdate) {
        match update {
            SessionUpdate::StateChanged(state) => {
                if matches!(state, ConnectionState::Disconnected | ConnectionState::Error) {
                    self.tracker.on_disconnected();
                }
                self.emit(ClientEvent::Connection(state));
            }
            SessionUpdate::Event(event) => self.handle_event(event).await,
            SessionUpdate::Speech(clip) => self.spool_speech(clip).await,
            SessionUpdate::Error(e) => {
                error!("Voice session error: {}", e);
                self.emit(ClientEvent::Error(e.to_string()));

                // Without a connection there is nowhere to stream to
                if self.tracker.mode() == VoiceMode::Continuous {
                    if let Err(stop_err) = self.stop_capture(None).await {
                        warn!("Error while stopping capture: {}", stop_err);
                    }
                }
                self.exit_voice_mode(Some(e.to_string()));
            }
        }
    }

    async fn handle_event(&self, event: SessionEvent) {
        let derived = self.tracker.on_event(&event);

        match event {
            SessionEvent::Transcript { text } => self.emit(ClientEvent::Transcript(text)),
            SessionEvent::Response { text } => self.emit(ClientEvent::Response(text)),
            SessionEvent::Songs { summary, songs } => {
                info!("Received {} song recommendations", songs.len());
                self.emit(ClientEvent::Songs { summary, songs });
            }
            SessionEvent::Error { message } => {
                warn!("Server reported an error: {}", message);
                self.emit(ClientEvent::Error(message));
            }
            SessionEvent::VoiceModeStop { message } if derived.exit_voice_mode => {
                if let Err(e) = self.stop_capture(None).await {
                    warn!("Error while stopping capture: {}", e);
                }
                self.emit(ClientEvent::VoiceModeExited { message });
            }
            _ => {}
        }
    }

    async fn spool_speech(&self, clip: SpeechClip) {
        match clip.write_to(&self.speech_dir).await {
            Ok(path) => self.emit(ClientEvent::SpeechReady {
                path,
                format: clip.format,
            }),
            Err(e) => {
                error!("Failed to spool speech clip: {}", e);
                self.emit(ClientEvent::Error(format!("failed to save speech: {}", e)));
            }
        }
    }
}

async fn run_session_pump(inner: Arc<ClientInner>, mut updates: mpsc::UnboundedReceiver<SessionUpdate>) {
    while let Some(update) = updates.recv().await {
        inner.handle_update(update).await;
    }
    debug!("Session update pump stopped");
}

async fn run_interaction_pump(inner: Arc<ClientInner>, mut rx: watch::Receiver<InteractionState>) {
    while rx.changed().await.is_ok() {
        let state = *rx.borrow_and_update();
        inner.emit(ClientEvent::Interaction(state));
    }
}

async fn run_capture_forwarder(
    inner: Arc<ClientInner>,
    mut frames: mpsc::UnboundedReceiver<CaptureEvent>,
    epoch: u64,
) {
    debug!("Capture forwarder {} started", epoch);

    while let Some(event) = frames.recv().await {
        match event {
            // Dropped by the session unless connected
            CaptureEvent::Frame(frame) => {
                inner.session.send_audio_frame(&frame);
            }
            CaptureEvent::Error(e) => {
                error!("Capture failed: {}", e);
                inner.emit(ClientEvent::Error(e.to_string()));
                if let Err(stop_err) = inner.stop_capture(Some(epoch)).await {
                    warn!("Error while releasing failed capture: {}", stop_err);
                }
                inner.exit_voice_mode(Some(e.to_string()));
            }
            CaptureEvent::Ended => {
                info!("Capture source finished");
                if let Err(e) = inner.stop_capture(Some(epoch)).await {
                    warn!("Error while releasing finished capture: {}", e);
                }
            }
        }
    }

    debug!("Capture forwarder {} stopped", epoch);
}
