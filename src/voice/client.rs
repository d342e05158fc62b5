use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::connection::{DuplexByteConnection, WireMessage, WireSink};
use super::messages::SessionEvent;
use super::speech::SpeechClip;
use super::stats::SessionStats;
use crate::audio::AudioFrame;
use crate::error::SessionError;

/// Lifecycle of the voice session connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Item delivered to the consumer of a voice session, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged(ConnectionState),
    Event(SessionEvent),
    Speech(SpeechClip),
    Error(SessionError),
}

/// Configuration for the voice session client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Voice server URL (e.g. "ws://localhost:8000/ws/voice")
    pub url: String,

    /// Messages buffered towards the transport while connected; further
    /// sends are dropped when it is full
    pub outbound_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/voice".to_string(),
            outbound_queue: 64, // ~2s of audio frames
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    messages_sent: AtomicU64,
    events_received: AtomicU64,
    speech_clips_received: AtomicU64,
    malformed_messages: AtomicU64,
}

struct Shared {
    state: ConnectionState,
    /// Bumped by every connect/disconnect; drivers from older generations
    /// may no longer change the state
    generation: u64,
    outbound: Option<mpsc::Sender<WireMessage>>,
    shutdown: Option<oneshot::Sender<()>>,
    connected_since: Option<DateTime<Utc>>,
}

struct Inner {
    config: SessionConfig,
    connection: Arc<dyn DuplexByteConnection>,
    shared: Mutex<Shared>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    counters: Counters,
}

/// Client for one persistent connection to the voice server
///
/// Outbound audio frames travel as binary messages and control messages as
/// JSON text; inbound binary messages are synthesized speech, inbound text
/// messages are `SessionEvent`s. Cloning yields another handle to the same
/// session.
#[derive(Clone)]
pub struct VoiceSessionClient {
    inner: Arc<Inner>,
}

impl VoiceSessionClient {
    /// Create a disconnected client and the channel its updates arrive on
    pub fn new(
        config: SessionConfig,
        connection: Arc<dyn DuplexByteConnection>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (updates, updates_rx) = mpsc::unbounded_channel();

        let inner = Inner {
            config,
            connection,
            shared: Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                generation: 0,
                outbound: None,
                shutdown: None,
                connected_since: None,
            }),
            updates,
            counters: Counters::default(),
        };

        (
            Self {
                inner: Arc::new(inner),
            },
            updates_rx,
        )
    }

    /// Open the connection in the background
    ///
    /// A no-op while already connecting or connected, so at most one
    /// underlying connection exists at a time.
    pub fn connect(&self) {
        let (generation, shutdown_rx) = {
            let mut shared = self.inner.lock();
            if matches!(
                shared.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!("Connect ignored: session is {:?}", shared.state);
                return;
            }

            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            shared.generation += 1;
            shared.shutdown = Some(shutdown_tx);
            self.inner
                .set_state(&mut shared, ConnectionState::Connecting);
            (shared.generation, shutdown_rx)
        };

        info!(
            "Opening voice session to {} via {}",
            self.inner.config.url,
            self.inner.connection.name()
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.drive(generation, shutdown_rx).await;
        });
    }

    /// Close the connection (idempotent); later sends are dropped
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();

        shared.generation += 1;
        shared.outbound = None;
        shared.connected_since = None;
        if let Some(shutdown) = shared.shutdown.take() {
            let _ = shutdown.send(());
        }

        if shared.state != ConnectionState::Disconnected {
            info!("Disconnecting voice session");
            self.inner
                .set_state(&mut shared, ConnectionState::Disconnected);
        }
    }

    /// Queue one audio frame as a binary message
    ///
    /// Fire-and-forget: returns false when the frame was dropped because the
    /// session is not connected or the outbound queue is full.
    pub fn send_audio_frame(&self, frame: &AudioFrame) -> bool {
        let accepted = self
            .inner
            .try_send(WireMessage::Binary(frame.to_le_bytes()));
        if !accepted {
            self.inner
                .counters
                .frames_dropped
                .fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Queue one structured control message as JSON text
    ///
    /// Returns `Ok(false)` when the message was dropped because the session
    /// is not connected or the outbound queue is full.
    pub fn send_control_message<M: Serialize>(&self, message: &M) -> Result<bool, serde_json::Error> {
        let text = serde_json::to_string(message)?;
        Ok(self.inner.try_send(WireMessage::Text(text)))
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> SessionStats {
        let (state, connected_since) = {
            let shared = self.inner.lock();
            (shared.state, shared.connected_since)
        };
        let counters = &self.inner.counters;

        SessionStats {
            state,
            connected_since,
            frames_sent: counters.frames_sent.load(Ordering::Relaxed),
            frames_dropped: counters.frames_dropped.load(Ordering::Relaxed),
            messages_sent: counters.messages_sent.load(Ordering::Relaxed),
            events_received: counters.events_received.load(Ordering::Relaxed),
            speech_clips_received: counters.speech_clips_received.load(Ordering::Relaxed),
            malformed_messages: counters.malformed_messages.load(Ordering::Relaxed),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        // A panic while holding the lock leaves plain data behind; keep going
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Change state and announce it; the caller holds the lock so updates
    /// are emitted in transition order
    fn set_state(&self, shared: &mut Shared, state: ConnectionState) {
        if shared.state == state {
            return;
        }
        debug!("Voice session {:?} -> {:?}", shared.state, state);
        shared.state = state;
        let _ = self.updates.send(SessionUpdate::StateChanged(state));
    }

    fn emit(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }

    fn try_send(&self, message: WireMessage) -> bool {
        let shared = self.lock();
        if shared.state != ConnectionState::Connected {
            return false;
        }

        match shared.outbound.as_ref().map(|tx| tx.try_send(message)) {
            Some(Ok(())) => true,
            Some(Err(mpsc::error::TrySendError::Full(_))) => {
                warn!("Outbound queue full, dropping message");
                false
            }
            Some(Err(mpsc::error::TrySendError::Closed(_))) | None => false,
        }
    }

    /// Transport failure: enter `error` and report the reason
    fn fail(&self, generation: u64, err: SessionError) {
        let mut shared = self.lock();
        if shared.generation != generation {
            return;
        }

        error!("Voice session failed: {}", err);
        shared.outbound = None;
        shared.shutdown = None;
        shared.connected_since = None;
        self.set_state(&mut shared, ConnectionState::Error);
        self.emit(SessionUpdate::Error(err));
    }

    /// Peer closed the connection: back to `disconnected`
    fn closed(&self, generation: u64, reason: String) {
        let mut shared = self.lock();
        if shared.generation != generation {
            return;
        }

        warn!("Voice session closed by server: {}", reason);
        shared.outbound = None;
        shared.shutdown = None;
        shared.connected_since = None;
        self.set_state(&mut shared, ConnectionState::Disconnected);
        self.emit(SessionUpdate::Error(SessionError::ConnectionClosed(reason)));
    }

    async fn drive(self: Arc<Self>, generation: u64, mut shutdown_rx: oneshot::Receiver<()>) {
        let opened = tokio::select! {
            result = self.connection.open(&self.config.url) => result,
            _ = &mut shutdown_rx => {
                debug!("Connect cancelled before the connection opened");
                return;
            }
        };

        let (mut sink, mut stream) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                self.fail(generation, e);
                return;
            }
        };

        let (out_tx, mut out_rx) = mpsc::channel(self.config.outbound_queue.max(1));
        let current = {
            let mut shared = self.lock();
            let current = shared.generation == generation;
            if current {
                shared.outbound = Some(out_tx);
                shared.connected_since = Some(Utc::now());
                self.set_state(&mut shared, ConnectionState::Connected);
            }
            current
        };

        if !current {
            debug!("Connection opened after disconnect; closing it");
            close_sink(&mut sink).await;
            return;
        }

        info!("Voice session connected");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    self.discard_pending(&mut out_rx);
                    close_sink(&mut sink).await;
                    break;
                }
                Some(message) = out_rx.recv() => {
                    let is_binary = matches!(message, WireMessage::Binary(_));
                    if let Err(e) = sink.send(message).await {
                        self.fail(generation, e);
                        break;
                    }
                    if is_binary {
                        self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(WireMessage::Binary(bytes))) => {
                        self.counters.speech_clips_received.fetch_add(1, Ordering::Relaxed);
                        self.emit(SessionUpdate::Speech(SpeechClip::from_bytes(bytes)));
                    }
                    Some(Ok(WireMessage::Text(text))) => self.dispatch_text(&text),
                    Some(Err(SessionError::ConnectionClosed(reason))) => {
                        self.closed(generation, reason);
                        break;
                    }
                    Some(Err(e)) => {
                        self.fail(generation, e);
                        break;
                    }
                    None => {
                        self.closed(generation, "stream ended".to_string());
                        break;
                    }
                },
            }
        }

        debug!("Voice session driver (generation {}) exiting", generation);
    }

    /// Drops whatever was queued before the disconnect without sending it.
    fn discard_pending(&self, out_rx: &mut mpsc::Receiver<WireMessage>) {
        out_rx.close();
        let mut discarded = 0;
        while let Ok(message) = out_rx.try_recv() {
            if matches!(message, WireMessage::Binary(_)) {
                self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Discarded {} queued messages on disconnect", discarded);
        }
    }

    fn dispatch_text(&self, text: &str) {
        match SessionEvent::parse(text) {
            Ok(SessionEvent::Unknown { kind }) => {
                warn!("Ignoring unknown session event: {}", kind);
            }
            Ok(event) => {
                debug!("Session event: {}", event.kind());
                self.counters.events_received.fetch_add(1, Ordering::Relaxed);
                self.emit(SessionUpdate::Event(event));
            }
            Err(e) => {
                self.counters.malformed_messages.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping inbound message: {}", e);
            }
        }
    }
}

async fn close_sink(sink: &mut WireSink) {
    if let Err(e) = sink.close().await {
        debug!("Error while closing transport: {}", e);
    }
}
