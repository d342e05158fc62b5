use super::state::AppState;
use crate::error::{CaptureError, ClientError};
use crate::interaction::{InteractionState, LocalRecordingState, VoiceMode};
use crate::voice::ConnectionState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub connection: ConnectionState,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub capturing: bool,
}

#[derive(Debug, Serialize)]
pub struct VoiceModeResponse {
    pub mode: VoiceMode,
    pub capturing: bool,
}

#[derive(Debug, Deserialize)]
pub struct PushToTalkRequest {
    pub state: LocalRecordingState,

    /// Set on the update that delivers a successful result
    #[serde(default)]
    pub result_ready: bool,
}

#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub interaction: InteractionState,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    /// False when the outbound queue was full and the message was dropped
    pub queued: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn client_error_response(e: &ClientError) -> Response {
    let status = match e {
        ClientError::NotConnected => StatusCode::CONFLICT,
        ClientError::Capture(CaptureError::PermissionDenied)
        | ClientError::Capture(CaptureError::DeviceUnavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ClientError::Encode(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

fn send_result(result: Result<bool, ClientError>) -> Response {
    match result {
        Ok(true) => (StatusCode::ACCEPTED, Json(SendResponse { queued: true })).into_response(),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SendResponse { queued: false }),
        )
            .into_response(),
        Err(e) => {
            warn!("Send failed: {}", e);
            client_error_response(&e)
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.client.status().await))
}

/// POST /session/connect
/// Open the voice session in the background
pub async fn connect(State(state): State<AppState>) -> impl IntoResponse {
    state.client.connect();
    (
        StatusCode::ACCEPTED,
        Json(ConnectionResponse {
            connection: state.client.connection_state(),
        }),
    )
}

/// POST /session/disconnect
pub async fn disconnect(State(state): State<AppState>) -> impl IntoResponse {
    state.client.disconnect();
    (
        StatusCode::OK,
        Json(ConnectionResponse {
            connection: state.client.connection_state(),
        }),
    )
}

/// POST /session/message
/// Forward a JSON object to the voice server
pub async fn send_message(
    State(state): State<AppState>,
    Json(message): Json<serde_json::Value>,
) -> Response {
    if !message.is_object() {
        return error_response(StatusCode::BAD_REQUEST, "message must be a JSON object");
    }

    send_result(state.client.send_message(&message))
}

/// POST /capture/start
pub async fn start_capture(State(state): State<AppState>) -> Response {
    match state.client.start_capture().await {
        Ok(()) => (
            StatusCode::OK,
            Json(CaptureResponse {
                capturing: state.client.is_capturing().await,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start capture: {}", e);
            client_error_response(&e)
        }
    }
}

/// POST /capture/stop
pub async fn stop_capture(State(state): State<AppState>) -> Response {
    match state.client.stop_capture().await {
        Ok(()) => (StatusCode::OK, Json(CaptureResponse { capturing: false })).into_response(),
        Err(e) => {
            error!("Failed to stop capture: {}", e);
            client_error_response(&e)
        }
    }
}

/// POST /voice-mode/start
/// Connect and stream the microphone continuously
pub async fn start_voice_mode(State(state): State<AppState>) -> Response {
    info!("Voice mode requested");
    match state.client.start_voice_mode().await {
        Ok(()) => (
            StatusCode::OK,
            Json(VoiceModeResponse {
                mode: state.client.voice_mode(),
                capturing: state.client.is_capturing().await,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start voice mode: {}", e);
            client_error_response(&e)
        }
    }
}

/// POST /voice-mode/stop
pub async fn stop_voice_mode(State(state): State<AppState>) -> Response {
    match state.client.stop_voice_mode().await {
        Ok(()) => (
            StatusCode::OK,
            Json(VoiceModeResponse {
                mode: state.client.voice_mode(),
                capturing: false,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop voice mode: {}", e);
            client_error_response(&e)
        }
    }
}

/// POST /push-to-talk
/// Report local recording activity
pub async fn push_to_talk(
    State(state): State<AppState>,
    Json(req): Json<PushToTalkRequest>,
) -> impl IntoResponse {
    let interaction = state.client.set_local_recording(req.state, req.result_ready);
    (StatusCode::OK, Json(InteractionResponse { interaction }))
}

/// POST /speech/finished
/// Playback of the last speech clip finished
pub async fn speech_finished(State(state): State<AppState>) -> Response {
    send_result(state.client.playback_finished())
}
