// In-memory stand-ins for the microphone and the network
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::SinkExt;
use tokio::sync::mpsc;
use voice_client::audio::{AudioChunk, CaptureConstraints, MicrophoneSource, SourceEvent};
use voice_client::error::{CaptureError, SessionError};
use voice_client::voice::{DuplexByteConnection, WireMessage, WireSink, WireStream};

// ============================================================================
// Microphone
// ============================================================================

/// Test-side handle to feed a `MockSource`
#[derive(Clone, Default)]
pub struct MockSourceHandle {
    sender: Arc<Mutex<Option<mpsc::Sender<SourceEvent>>>>,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub last_constraints: Arc<Mutex<Option<CaptureConstraints>>>,
}

impl MockSourceHandle {
    pub async fn send(&self, event: SourceEvent) {
        let sender = self.sender.lock().unwrap().clone();
        sender
            .expect("source not started")
            .send(event)
            .await
            .expect("capture pipeline went away");
    }

    pub async fn send_chunk(&self, samples: Vec<i16>, sample_rate: u32, channels: u16) {
        self.send(SourceEvent::Chunk(AudioChunk {
            samples,
            sample_rate,
            channels,
            timestamp_ms: 0,
        }))
        .await;
    }

    /// Simulate the device running out of audio
    pub fn finish(&self) {
        self.sender.lock().unwrap().take();
    }

    pub fn is_open(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }
}

pub struct MockSource {
    handle: MockSourceHandle,
    fail_with: Option<CaptureError>,
}

impl MockSource {
    pub fn new() -> (Self, MockSourceHandle) {
        let handle = MockSourceHandle::default();
        (
            Self {
                handle: handle.clone(),
                fail_with: None,
            },
            handle,
        )
    }

    pub fn failing(error: CaptureError) -> (Self, MockSourceHandle) {
        let (mut source, handle) = Self::new();
        source.fail_with = Some(error);
        (source, handle)
    }

    pub fn with_handle(handle: MockSourceHandle) -> Self {
        Self {
            handle,
            fail_with: None,
        }
    }
}

#[async_trait::async_trait]
impl MicrophoneSource for MockSource {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<SourceEvent>, CaptureError> {
        self.handle.starts.fetch_add(1, Ordering::SeqCst);
        *self.handle.last_constraints.lock().unwrap() = Some(constraints.clone());

        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }

        let (tx, rx) = mpsc::channel(constraints.channel_capacity);
        *self.handle.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.handle.stops.fetch_add(1, Ordering::SeqCst);
        self.handle.sender.lock().unwrap().take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.handle.is_open()
    }

    fn name(&self) -> &str {
        "mock microphone"
    }
}

// ============================================================================
// Network
// ============================================================================

/// Server side of one opened mock connection
pub struct ServerEnd {
    pub from_client: futures::channel::mpsc::UnboundedReceiver<WireMessage>,
    pub to_client: futures::channel::mpsc::UnboundedSender<Result<WireMessage, SessionError>>,
}

impl ServerEnd {
    pub fn send_text(&self, text: &str) {
        self.to_client
            .unbounded_send(Ok(WireMessage::Text(text.to_string())))
            .expect("client stream dropped");
    }

    pub fn send_binary(&self, bytes: Vec<u8>) {
        self.to_client
            .unbounded_send(Ok(WireMessage::Binary(bytes)))
            .expect("client stream dropped");
    }

    pub fn fail(&self, error: SessionError) {
        let _ = self.to_client.unbounded_send(Err(error));
    }

    /// Next message the client wrote, or None once the client closed
    pub async fn recv(&mut self) -> Option<WireMessage> {
        use futures::StreamExt;
        tokio::time::timeout(Duration::from_secs(2), self.from_client.next())
            .await
            .expect("timed out waiting for client message")
    }
}

pub struct MockConnection {
    pub opens: AtomicUsize,
    open_delay: Duration,
    fail_with: Option<SessionError>,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl MockConnection {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(Duration::ZERO, None)
    }

    /// Every `open` takes `delay` before it resolves
    pub fn slow(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(delay, None)
    }

    pub fn refusing(error: SessionError) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(Duration::ZERO, Some(error))
    }

    fn build(
        open_delay: Duration,
        fail_with: Option<SessionError>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, servers_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                opens: AtomicUsize::new(0),
                open_delay,
                fail_with,
                servers,
            }),
            servers_rx,
        )
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DuplexByteConnection for MockConnection {
    async fn open(&self, _url: &str) -> Result<(WireSink, WireStream), SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }

        let (c2s_tx, c2s_rx) = futures::channel::mpsc::unbounded();
        let (s2c_tx, s2c_rx) = futures::channel::mpsc::unbounded();

        let _ = self.servers.send(ServerEnd {
            from_client: c2s_rx,
            to_client: s2c_tx,
        });

        let sink = c2s_tx.sink_map_err(|e| SessionError::Transport(e.to_string()));
        Ok((Box::pin(sink), Box::pin(s2c_rx)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for item")
        .expect("channel closed")
}

/// Ramp of `len` distinct samples starting at `start`
pub fn ramp(start: i32, len: usize) -> Vec<i16> {
    (0..len as i32).map(|i| ((start + i) % 32_000) as i16).collect()
}
