// Interaction state machine: idle / recording / thinking / complete
//
// `state` holds the pure derivation, `tracker` applies it to live inputs and
// owns the push-to-talk revert timer.

pub mod state;
pub mod tracker;

pub use state::{derive, Derived, InteractionState, Inputs, LocalRecordingState, VoiceMode};
pub use tracker::{InteractionTracker, DEFAULT_REVERT_AFTER};
