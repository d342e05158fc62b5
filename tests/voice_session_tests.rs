// Integration tests for the voice session client against an in-memory server

mod common;

use std::time::Duration;

use common::{recv_within, MockConnection};
use tokio::sync::mpsc;
use voice_client::audio::FrameAccumulator;
use voice_client::error::SessionError;
use voice_client::voice::{
    ConnectionState, ControlMessage, SessionConfig, SessionEvent, SessionUpdate,
    VoiceSessionClient, WireMessage,
};

fn config() -> SessionConfig {
    SessionConfig {
        url: "ws://test/ws/voice".to_string(),
        outbound_queue: 8,
    }
}

fn one_frame(value: i16) -> voice_client::audio::AudioFrame {
    FrameAccumulator::new()
        .push(&[value; 512])
        .pop()
        .expect("one frame")
}

async fn wait_for_state(updates: &mut mpsc::UnboundedReceiver<SessionUpdate>, wanted: ConnectionState) {
    loop {
        if let SessionUpdate::StateChanged(state) = recv_within(updates).await {
            if state == wanted {
                return;
            }
        }
    }
}

#[tokio::test]
async fn test_connect_reaches_connected() {
    let (connection, mut servers) = MockConnection::new();
    let (client, mut updates) = VoiceSessionClient::new(config(), connection.clone());

    assert_eq!(client.state(), ConnectionState::Disconnected);
    client.connect();

    assert_eq!(
        recv_within(&mut updates).await,
        SessionUpdate::StateChanged(ConnectionState::Connecting)
    );
    assert_eq!(
        recv_within(&mut updates).await,
        SessionUpdate::StateChanged(ConnectionState::Connected)
    );
    assert_eq!(client.state(), ConnectionState::Connected);

    recv_within(&mut servers).await;
    assert_eq!(connection.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_double_connect_opens_once() {
    let (connection, _servers) = MockConnection::slow(Duration::from_millis(200));
    let (client, mut updates) = VoiceSessionClient::new(config(), connection.clone());

    client.connect();
    client.connect();
    assert_eq!(client.state(), ConnectionState::Connecting);

    wait_for_state(&mut updates, ConnectionState::Connected).await;
    client.connect();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(connection.open_count(), 1);
}

#[tokio::test]
async fn test_frames_sent_as_binary() {
    let (connection, mut servers) = MockConnection::new();
    let (client, mut updates) = VoiceSessionClient::new(config(), connection);

    client.connect();
    wait_for_state(&mut updates, ConnectionState::Connected).await;
    let mut server = recv_within(&mut servers).await;

    let frame = one_frame(0x0102);
    assert!(client.send_audio_frame(&frame));

    match server.recv().await {
        Some(WireMessage::Binary(bytes)) => {
            assert_eq!(bytes.len(), 1024);
            assert_eq!(&bytes[..2], &[0x02, 0x01]);
        }
        other => panic!("expected binary frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_control_message_sent_as_text() {
    let (connection, mut servers) = MockConnection::new();
    let (client, mut updates) = VoiceSessionClient::new(config(), connection);

    client.connect();
    wait_for_state(&mut updates, ConnectionState::Connected).await;
    let mut server = recv_within(&mut servers).await;

    assert!(client.send_control_message(&ControlMessage::TtsComplete).unwrap());

    assert_eq!(
        server.recv().await,
        Some(WireMessage::Text(r#"{"event":"tts_complete"}"#.to_string()))
    );
}

#[tokio::test]
async fn test_send_while_disconnected_has_no_effect() {
    let (connection, mut servers) = MockConnection::new();
    let (client, mut updates) = VoiceSessionClient::new(config(), connection);

    // Nothing is queued for later
    assert!(!client.send_audio_frame(&one_frame(1)));
    assert!(!client.send_control_message(&ControlMessage::TtsComplete).unwrap());

    client.connect();
    wait_for_state(&mut updates, ConnectionState::Connected).await;
    let mut server = recv_within(&mut servers).await;

    assert!(client.send_audio_frame(&one_frame(2)));
    match server.recv().await {
        Some(WireMessage::Binary(bytes)) => assert_eq!(&bytes[..2], &[2, 0]),
        other => panic!("expected the live frame, got {:?}", other),
    }

    let stats = client.stats();
    assert_eq!(stats.frames_dropped, 1);
}

#[tokio::test]
async fn test_inbound_dispatch() {
    let (connection, mut servers) = MockConnection::new();
    let (client, mut updates) = VoiceSessionClient::new(config(), connection);

    client.connect();
    wait_for_state(&mut updates, ConnectionState::Connected).await;
    let server = recv_within(&mut servers).await;

    server.send_text(r#"{"event": "listening"}"#);
    server.send_text("definitely not json");
    server.send_text(r#"{"event": "brand_new_event"}"#);
    server.send_binary(vec![1, 2, 3]);
    server.send_text(r#"{"event": "transcript", "text": "hello"}"#);

    assert_eq!(
        recv_within(&mut updates).await,
        SessionUpdate::Event(SessionEvent::Listening)
    );
    match recv_within(&mut updates).await {
        SessionUpdate::Speech(clip) => {
            assert_eq!(clip.bytes, vec![1, 2, 3]);
            assert!(!clip.is_wav());
        }
        other => panic!("expected speech, got {:?}", other),
    }
    assert_eq!(
        recv_within(&mut updates).await,
        SessionUpdate::Event(SessionEvent::Transcript {
            text: "hello".to_string()
        })
    );

    // Malformed text did not take the connection down
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.stats().malformed_messages, 1);
}

#[tokio::test]
async fn test_server_close_reports_connection_closed() {
    let (connection, mut servers) = MockConnection::new();
    let (client, mut updates) = VoiceSessionClient::new(config(), connection);

    client.connect();
    wait_for_state(&mut updates, ConnectionState::Connected).await;
    let server = recv_within(&mut servers).await;

    drop(server);

    assert_eq!(
        recv_within(&mut updates).await,
        SessionUpdate::StateChanged(ConnectionState::Disconnected)
    );
    assert!(matches!(
        recv_within(&mut updates).await,
        SessionUpdate::Error(SessionError::ConnectionClosed(_))
    ));
    assert!(!client.send_audio_frame(&one_frame(3)));
}

#[tokio::test]
async fn test_transport_failure_enters_error() {
    let (connection, mut servers) = MockConnection::new();
    let (client, mut updates) = VoiceSessionClient::new(config(), connection);

    client.connect();
    wait_for_state(&mut updates, ConnectionState::Connected).await;
    let server = recv_within(&mut servers).await;

    server.fail(SessionError::Transport("reset by peer".to_string()));

    assert_eq!(
        recv_within(&mut updates).await,
        SessionUpdate::StateChanged(ConnectionState::Error)
    );
    assert_eq!(
        recv_within(&mut updates).await,
        SessionUpdate::Error(SessionError::Transport("reset by peer".to_string()))
    );

    // Error is not terminal: the caller may connect again
    client.connect();
    wait_for_state(&mut updates, ConnectionState::Connected).await;
}

#[tokio::test]
async fn test_refused_connection() {
    let (connection, _servers) =
        MockConnection::refusing(SessionError::ConnectionFailed("connection refused".to_string()));
    let (client, mut updates) = VoiceSessionClient::new(config(), connection);

    client.connect();

    wait_for_state(&mut updates, ConnectionState::Error).await;
    assert!(matches!(
        recv_within(&mut updates).await,
        SessionUpdate::Error(SessionError::ConnectionFailed(_))
    ));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (connection, mut servers) = MockConnection::new();
    let (client, mut updates) = VoiceSessionClient::new(config(), connection);

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.connect();
    wait_for_state(&mut updates, ConnectionState::Connected).await;
    let mut server = recv_within(&mut servers).await;

    client.disconnect();
    client.disconnect();

    assert_eq!(
        recv_within(&mut updates).await,
        SessionUpdate::StateChanged(ConnectionState::Disconnected)
    );
    // The client closed its side; no ConnectionClosed error for a requested close
    assert_eq!(server.recv().await, None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn test_queued_frames_are_dropped_on_disconnect() {
    let (connection, mut servers) = MockConnection::new();
    let (client, mut updates) = VoiceSessionClient::new(config(), connection);

    client.connect();
    wait_for_state(&mut updates, ConnectionState::Connected).await;
    let mut server = recv_within(&mut servers).await;

    // Fill the outbound queue without yielding to the driver
    for i in 0..8 {
        assert!(client.send_audio_frame(&one_frame(i)));
    }
    client.disconnect();

    // The transport closes without a single queued frame on the wire
    assert_eq!(server.recv().await, None);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let stats = client.stats();
    assert_eq!(stats.frames_sent, 0);
    assert_eq!(stats.frames_dropped, 8);
}

#[tokio::test(start_paused = true)]
async fn test_stale_connection_does_not_override_newer_state() {
    let (connection, mut servers) = MockConnection::slow(Duration::from_millis(100));
    let (client, mut updates) = VoiceSessionClient::new(config(), connection.clone());

    // First attempt is abandoned while still opening
    client.connect();
    client.disconnect();
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.connect();

    wait_for_state(&mut updates, ConnectionState::Connected).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(client.state(), ConnectionState::Connected);
    let live = recv_within(&mut servers).await;
    live.send_text(r#"{"event": "ready"}"#);
    assert_eq!(
        recv_within(&mut updates).await,
        SessionUpdate::Event(SessionEvent::Ready)
    );
}
