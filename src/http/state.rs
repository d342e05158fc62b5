use crate::client::VoiceClient;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The one voice client this process drives
    pub client: Arc<VoiceClient>,
}

impl AppState {
    pub fn new(client: Arc<VoiceClient>) -> Self {
        Self { client }
    }
}
