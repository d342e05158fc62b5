// Integration tests for the HTTP control API
//
// Requests go through the router in-process with tower's `oneshot`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{recv_within, MockConnection, MockSource, MockSourceHandle, ServerEnd};
use tokio::sync::mpsc;
use tower::ServiceExt;
use voice_client::audio::MicrophoneSource;
use voice_client::client::{ClientConfig, SourceFactory, VoiceClient};
use voice_client::error::CaptureError;
use voice_client::http::{create_router, AppState};
use voice_client::voice::{ConnectionState, WireMessage};

struct Api {
    router: Router,
    client: Arc<VoiceClient>,
    servers: mpsc::UnboundedReceiver<ServerEnd>,
    mic: MockSourceHandle,
}

fn api_with(factory: SourceFactory, mic: MockSourceHandle) -> Api {
    let (connection, servers) = MockConnection::new();
    let (client, _events) = VoiceClient::new(ClientConfig::default(), connection, factory);
    let client = Arc::new(client);

    Api {
        router: create_router(AppState::new(Arc::clone(&client))),
        client,
        servers,
        mic,
    }
}

fn api() -> Api {
    let mic = MockSourceHandle::default();
    let handle = mic.clone();
    api_with(
        Box::new(move || Box::new(MockSource::with_handle(handle.clone())) as Box<dyn MicrophoneSource>),
        mic,
    )
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

    (status, json)
}

async fn wait_connected(client: &VoiceClient) {
    for _ in 0..100 {
        if client.connection_state() == ConnectionState::Connected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("client never connected");
}

#[tokio::test]
async fn test_health_check() {
    let api = api();

    let response = api
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_status() {
    let api = api();

    let (status, json) = call(&api.router, "GET", "/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["connection"], "disconnected");
    assert_eq!(json["interaction"], "idle");
    assert_eq!(json["mode"], "push_to_talk");
    assert_eq!(json["server_ready"], false);
    assert!(json["capture"].is_null());
}

#[tokio::test]
async fn test_connect_and_send_message() {
    let mut api = api();

    let (status, _) = call(&api.router, "POST", "/session/connect", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_connected(&api.client).await;
    let mut server = recv_within(&mut api.servers).await;

    let (status, json) = call(
        &api.router,
        "POST",
        "/session/message",
        Some(r#"{"event": "set_volume", "level": 40}"#),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["queued"], true);
    match server.recv().await {
        Some(WireMessage::Text(text)) => {
            let sent: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(sent["event"], "set_volume");
            assert_eq!(sent["level"], 40);
        }
        other => panic!("expected text message, got {:?}", other),
    }

    let (status, json) = call(&api.router, "POST", "/session/disconnect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["connection"], "disconnected");
}

#[tokio::test]
async fn test_message_requires_connection() {
    let api = api();

    let (status, json) =
        call(&api.router, "POST", "/session/message", Some(r#"{"event": "x"}"#)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "voice session is not connected");
}

#[tokio::test]
async fn test_message_must_be_an_object() {
    let api = api();

    let (status, _) = call(&api.router, "POST", "/session/message", Some("[1, 2]")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capture_start_stop() {
    let api = api();

    let (status, json) = call(&api.router, "POST", "/capture/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["capturing"], true);
    assert!(api.mic.is_open());

    let (status, json) = call(&api.router, "POST", "/capture/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["capturing"], false);
    assert!(!api.mic.is_open());
}

#[tokio::test]
async fn test_capture_permission_denied() {
    let factory: SourceFactory = Box::new(|| {
        let (source, _handle) = MockSource::failing(CaptureError::PermissionDenied);
        Box::new(source) as Box<dyn MicrophoneSource>
    });
    let api = api_with(factory, MockSourceHandle::default());

    let (status, json) = call(&api.router, "POST", "/capture/start", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "microphone permission denied");
}

#[tokio::test]
async fn test_voice_mode_round_trip() {
    let api = api();

    let (status, json) = call(&api.router, "POST", "/voice-mode/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mode"], "continuous");
    assert_eq!(json["capturing"], true);
    wait_connected(&api.client).await;

    let (status, json) = call(&api.router, "POST", "/voice-mode/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mode"], "push_to_talk");
    assert!(!api.mic.is_open());
    // Leaving voice mode does not close the session
    assert_eq!(api.client.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_push_to_talk_updates_interaction() {
    let api = api();

    let (status, json) = call(
        &api.router,
        "POST",
        "/push-to-talk",
        Some(r#"{"state": "recording"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["interaction"], "recording");

    call(&api.router, "POST", "/push-to-talk", Some(r#"{"state": "transcribing"}"#)).await;
    let (_, json) = call(
        &api.router,
        "POST",
        "/push-to-talk",
        Some(r#"{"state": "idle", "result_ready": true}"#),
    )
    .await;
    assert_eq!(json["interaction"], "complete");
}

#[tokio::test]
async fn test_push_to_talk_rejects_unknown_state() {
    let api = api();

    let (status, _) = call(
        &api.router,
        "POST",
        "/push-to-talk",
        Some(r#"{"state": "dancing"}"#),
    )
    .await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_speech_finished() {
    let mut api = api();

    let (status, _) = call(&api.router, "POST", "/speech/finished", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    call(&api.router, "POST", "/session/connect", None).await;
    wait_connected(&api.client).await;
    let mut server = recv_within(&mut api.servers).await;

    let (status, _) = call(&api.router, "POST", "/speech/finished", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        server.recv().await,
        Some(WireMessage::Text(r#"{"event":"tts_complete"}"#.to_string()))
    );
}
