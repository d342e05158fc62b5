use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::get_status))
        // Voice session
        .route("/session/connect", post(handlers::connect))
        .route("/session/disconnect", post(handlers::disconnect))
        .route("/session/message", post(handlers::send_message))
        // Microphone
        .route("/capture/start", post(handlers::start_capture))
        .route("/capture/stop", post(handlers::stop_capture))
        // Interaction
        .route("/voice-mode/start", post(handlers::start_voice_mode))
        .route("/voice-mode/stop", post(handlers::stop_voice_mode))
        .route("/push-to-talk", post(handlers::push_to_talk))
        .route("/speech/finished", post(handlers::speech_finished))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
