use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Event kinds the client understands (wire names, aliases included)
const KNOWN_EVENTS: &[&str] = &[
    "loading",
    "ready",
    "wake_word_detected",
    "listening",
    "transcript",
    "agent_started",
    "songs",
    "music_playing",
    "response",
    "tts_interrupted",
    "interrupted",
    "voice_mode_stop",
    "idle_timeout",
    "error",
];

/// Track recommended by the server's music agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub album_art: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    /// Why the agent picked this track
    #[serde(default)]
    pub reason: Option<String>,
}

/// Structured event received from the voice server
///
/// Every text message carries exactly one event, discriminated by `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Server is loading its models
    Loading,
    /// Models are loaded and the server accepts audio
    Ready,
    WakeWordDetected,
    Listening,
    Transcript {
        text: String,
    },
    /// The music agent started searching
    AgentStarted,
    Songs {
        #[serde(default)]
        summary: Option<String>,
        #[serde(default)]
        songs: Vec<Song>,
    },
    MusicPlaying,
    Response {
        #[serde(default)]
        text: Option<String>,
    },
    /// The user barged in while synthesized speech was playing
    #[serde(rename = "tts_interrupted", alias = "interrupted")]
    Interrupted,
    /// The server asks the client to leave continuous voice mode
    VoiceModeStop {
        #[serde(default)]
        message: Option<String>,
    },
    IdleTimeout,
    Error {
        #[serde(default)]
        message: String,
    },
    /// An event kind this client does not know; logged and ignored
    #[serde(skip)]
    Unknown {
        kind: String,
    },
}

impl SessionEvent {
    /// Parse one structured message
    ///
    /// Well-formed objects with an unrecognised `event` become `Unknown`;
    /// anything else is a `MalformedMessage`.
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| SessionError::MalformedMessage(e.to_string()))?;

        let kind = value
            .get("event")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                SessionError::MalformedMessage("missing string field `event`".to_string())
            })?;

        if !KNOWN_EVENTS.contains(&kind) {
            return Ok(SessionEvent::Unknown {
                kind: kind.to_string(),
            });
        }

        serde_json::from_value(value).map_err(|e| SessionError::MalformedMessage(e.to_string()))
    }

    /// Wire name of this event
    pub fn kind(&self) -> &str {
        match self {
            SessionEvent::Loading => "loading",
            SessionEvent::Ready => "ready",
            SessionEvent::WakeWordDetected => "wake_word_detected",
            SessionEvent::Listening => "listening",
            SessionEvent::Transcript { .. } => "transcript",
            SessionEvent::AgentStarted => "agent_started",
            SessionEvent::Songs { .. } => "songs",
            SessionEvent::MusicPlaying => "music_playing",
            SessionEvent::Response { .. } => "response",
            SessionEvent::Interrupted => "tts_interrupted",
            SessionEvent::VoiceModeStop { .. } => "voice_mode_stop",
            SessionEvent::IdleTimeout => "idle_timeout",
            SessionEvent::Error { .. } => "error",
            SessionEvent::Unknown { kind } => kind,
        }
    }
}

/// Structured control message sent to the voice server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Playback of the last synthesized speech finished; resume listening
    TtsComplete,
}
