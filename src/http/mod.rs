//! HTTP control API for an out-of-process UI layer
//!
//! This module exposes the voice client over localhost:
//! - GET /health - Health check
//! - GET /status - Connection, interaction and capture snapshot
//! - POST /session/connect, /session/disconnect - Voice session lifecycle
//! - POST /session/message - Forward a JSON object to the server
//! - POST /capture/start, /capture/stop - Microphone
//! - POST /voice-mode/start, /voice-mode/stop - Continuous voice mode
//! - POST /push-to-talk - Report local recording activity
//! - POST /speech/finished - Speech playback finished

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, PushToTalkRequest};
pub use routes::create_router;
pub use state::AppState;
