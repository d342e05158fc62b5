use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::ConnectionState;

/// Statistics about the voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current connection state
    pub state: ConnectionState,

    /// When the current connection opened, if connected
    pub connected_since: Option<DateTime<Utc>>,

    /// Audio frames written to the transport
    pub frames_sent: u64,

    /// Audio frames discarded (not connected, or outbound queue full)
    pub frames_dropped: u64,

    /// Control messages written to the transport
    pub messages_sent: u64,

    /// Structured events received and dispatched
    pub events_received: u64,

    /// Binary speech clips received
    pub speech_clips_received: u64,

    /// Inbound messages dropped because they could not be parsed
    pub malformed_messages: u64,
}
