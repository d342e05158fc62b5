// Transport capability for the voice session
//
// The session client only needs a byte-oriented duplex connection that keeps
// binary and text messages apart. The production implementation is a
// WebSocket; tests substitute in-memory channels.

use std::pin::Pin;

use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info};

use crate::error::SessionError;

/// One message on the duplex connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Binary payload: PCM frames outbound, synthesized speech inbound
    Binary(Vec<u8>),
    /// Text payload: one JSON object
    Text(String),
}

/// Outbound half of an open connection
pub type WireSink = Pin<Box<dyn Sink<WireMessage, Error = SessionError> + Send>>;

/// Inbound half of an open connection; ends when the peer closes
pub type WireStream = Pin<Box<dyn Stream<Item = Result<WireMessage, SessionError>> + Send>>;

/// Opens persistent bidirectional connections to the voice server
#[async_trait::async_trait]
pub trait DuplexByteConnection: Send + Sync {
    /// Open a connection and split it into its outbound and inbound halves
    async fn open(&self, url: &str) -> Result<(WireSink, WireStream), SessionError>;

    /// Get transport name for logging
    fn name(&self) -> &str;
}

/// WebSocket transport (ws:// and wss://)
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnection;

impl WebSocketConnection {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl DuplexByteConnection for WebSocketConnection {
    async fn open(&self, url: &str) -> Result<(WireSink, WireStream), SessionError> {
        info!("Connecting to voice server at {}", url);

        let (ws, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket handshake complete (status {})", response.status());

        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| SessionError::Transport(e.to_string()))
            .with(|msg: WireMessage| {
                future::ready(Ok::<Message, SessionError>(match msg {
                    WireMessage::Binary(bytes) => Message::Binary(bytes),
                    WireMessage::Text(text) => Message::Text(text),
                }))
            });

        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(Message::Binary(bytes)) => Some(Ok(WireMessage::Binary(bytes))),
                Ok(Message::Text(text)) => Some(Ok(WireMessage::Text(text))),
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    Some(Err(SessionError::ConnectionClosed(reason)))
                }
                // Ping/pong are answered by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
                Err(tungstenite::Error::ConnectionClosed) => Some(Err(
                    SessionError::ConnectionClosed("connection closed".to_string()),
                )),
                Err(e) => Some(Err(SessionError::Transport(e.to_string()))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}
