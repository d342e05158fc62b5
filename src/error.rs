//! Error taxonomy for the capture and session components
//!
//! Capture errors and session errors are reported independently: a capture
//! failure never tears down an open voice session, and vice versa.

use thiserror::Error;

/// Errors raised by microphone acquisition and the capture pipeline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The platform or the user refused microphone access
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No capture device exists, or it disappeared mid-session
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Any other device-level fault reported by the source
    #[error("capture device error: {0}")]
    Device(String),

    /// The device delivers a format the pipeline cannot convert
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

/// Errors raised by the voice session client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The connection could not be opened
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The server (or the network) closed the connection
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// An inbound structured message could not be parsed
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The transport failed while the connection was open
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by the client facade
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("voice session is not connected")]
    NotConnected,

    #[error("failed to encode control message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
