// Voice session: the persistent duplex connection to the voice server
//
// Audio frames go out as binary messages and control messages as JSON text.
// Inbound binary messages are synthesized speech; inbound text messages are
// structured session events.

pub mod client;
pub mod connection;
pub mod messages;
pub mod speech;
pub mod stats;

pub use client::{ConnectionState, SessionConfig, SessionUpdate, VoiceSessionClient};
pub use connection::{DuplexByteConnection, WebSocketConnection, WireMessage, WireSink, WireStream};
pub use messages::{ControlMessage, SessionEvent, Song};
pub use speech::{SpeechClip, SpeechFormat};
pub use stats::SessionStats;
