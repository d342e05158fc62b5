use serde::{Deserialize, Serialize};

use crate::voice::SessionEvent;

/// What the interaction indicator shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    #[default]
    Idle,
    Recording,
    Thinking,
    Complete,
}

/// How the user talks to the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceMode {
    /// Audio streams continuously; the server's events drive the state
    Continuous,
    /// Discrete record-then-send; local recording activity drives the state
    #[default]
    PushToTalk,
}

/// Local recording activity in push-to-talk mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalRecordingState {
    #[default]
    Idle,
    Recording,
    Transcribing,
}

/// Everything the interaction state is derived from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    pub mode: VoiceMode,
    /// Most recent event from the voice server, if any arrived yet
    pub last_event: Option<SessionEvent>,
    pub local: LocalRecordingState,
    /// A successful push-to-talk result arrived with this update
    pub result_ready: bool,
}

/// Outcome of one derivation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    pub state: InteractionState,
    /// The server asked the client to leave continuous voice mode
    pub exit_voice_mode: bool,
}

impl Derived {
    fn stay(state: InteractionState) -> Self {
        Self {
            state,
            exit_voice_mode: false,
        }
    }
}

/// Derive the next interaction state from the previous one and the inputs
pub fn derive(previous: InteractionState, inputs: &Inputs) -> Derived {
    match inputs.mode {
        VoiceMode::Continuous => derive_continuous(previous, inputs.last_event.as_ref()),
        VoiceMode::PushToTalk => {
            Derived::stay(derive_push_to_talk(previous, inputs.local, inputs.result_ready))
        }
    }
}

fn derive_continuous(previous: InteractionState, event: Option<&SessionEvent>) -> Derived {
    use InteractionState::*;

    let Some(event) = event else {
        return Derived::stay(Idle);
    };

    let state = match event {
        SessionEvent::Loading => Thinking,
        // Readiness is tracked separately
        SessionEvent::Ready => previous,
        SessionEvent::WakeWordDetected | SessionEvent::Listening => Recording,
        SessionEvent::Transcript { .. } | SessionEvent::AgentStarted => Thinking,
        SessionEvent::Response { .. } | SessionEvent::Songs { .. } => Complete,
        SessionEvent::MusicPlaying => previous,
        SessionEvent::Interrupted | SessionEvent::IdleTimeout => Idle,
        SessionEvent::VoiceModeStop { .. } => {
            return Derived {
                state: Idle,
                exit_voice_mode: true,
            };
        }
        SessionEvent::Error { .. } => Idle,
        SessionEvent::Unknown { .. } => previous,
    };

    Derived::stay(state)
}

fn derive_push_to_talk(
    previous: InteractionState,
    local: LocalRecordingState,
    result_ready: bool,
) -> InteractionState {
    match local {
        LocalRecordingState::Recording => InteractionState::Recording,
        LocalRecordingState::Transcribing => InteractionState::Thinking,
        LocalRecordingState::Idle => match previous {
            InteractionState::Thinking if result_ready => InteractionState::Complete,
            InteractionState::Complete => InteractionState::Complete,
            _ => InteractionState::Idle,
        },
    }
}
