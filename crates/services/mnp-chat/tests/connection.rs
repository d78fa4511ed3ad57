mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CountingTokens, ScriptedBackend, WsServer, quiet_options, wait_for_conn, wait_for_state};
use mnp_chat::types::{ChatMode, ConnectionStatus, MessageType};
use mnp_chat::ws::{Envelope, EnvelopeKind, Phase};
use mnp_chat::{ChatError, ChatStore, ConnectionManager, ConnectionOptions, StoreOptions};
use serde_json::json;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

fn options(url: &str) -> ConnectionOptions {
    ConnectionOptions {
        ws_url: url.to_string(),
        heartbeat_interval: Duration::ZERO,
        reconnect_base: Duration::from_millis(10),
        reconnect_max_delay: Duration::from_millis(50),
        max_reconnect_attempts: 3,
        pong_timeout_heartbeats: None,
        connect_timeout: Duration::from_secs(2),
    }
}

fn session_store() -> ChatStore {
    let store = ChatStore::new(
        Arc::new(ScriptedBackend::default()),
        StoreOptions {
            session_token: Some("sess-1".into()),
            ..quiet_options()
        },
    );
    store.start_new_session(ChatMode::StepByStep);
    store
}

struct Harness {
    server: WsServer,
    store: ChatStore,
    conn: ConnectionManager,
    tokens: Arc<CountingTokens>,
}

async fn connected_with(opts: impl FnOnce(&mut ConnectionOptions)) -> Harness {
    let mut server = WsServer::start().await;
    let store = session_store();
    let tokens = Arc::new(CountingTokens::default());
    let mut o = options(&server.url);
    opts(&mut o);
    let conn = ConnectionManager::spawn(o, tokens.clone(), store.clone());

    conn.connect().await.unwrap();
    server.next_handshake().await;
    server.expect_kind("join_session").await;
    Harness {
        server,
        store,
        conn,
        tokens,
    }
}

async fn connected() -> Harness {
    connected_with(|_| {}).await
}

/// Sends a marker message and waits for the store to show it, so every
/// frame sent before it has been handled.
async fn sync(h: &Harness, marker: &str) {
    h.server.send(json!({"type": "message", "messageId": marker, "content": marker}));
    wait_for_state(&h.store, |s| s.messages.iter().any(|m| m.id == marker)).await;
}

#[tokio::test]
async fn connect_passes_credentials_and_joins_session() {
    let mut server = WsServer::start().await;
    let store = session_store();
    let tokens = Arc::new(CountingTokens::default());
    let conn = ConnectionManager::spawn(options(&server.url), tokens.clone(), store.clone());

    conn.connect().await.unwrap();
    let uri = server.next_handshake().await;
    assert!(uri.contains("token=ws-token-0"), "{uri}");
    assert!(uri.contains("sessionToken=sess-1"), "{uri}");

    let join = server.expect_kind("join_session").await;
    assert_eq!(join["sessionToken"], "sess-1");
    assert!(join["timestamp"].is_string());

    let state = conn.state();
    assert!(state.is_connected);
    assert_eq!(state.phase, Phase::Open);
    assert_eq!(state.reconnect_attempts, 0);
    let ui = store.snapshot().ui;
    assert!(ui.is_connected);
    assert_eq!(ui.connection, ConnectionStatus::Connected);

    conn.connect().await.unwrap();
    assert_eq!(tokens.calls(), 1);
    conn.shutdown().await;
}

#[tokio::test]
async fn inbound_messages_reach_the_store() {
    let h = connected().await;

    h.server.send(json!({
        "type": "message",
        "messageId": "srv-1",
        "content": "Your reservation number is valid for 15 days.",
        "timestamp": "2025-03-01T10:00:00Z",
        "metadata": {"confidence": 0.7, "responseTime": 80}
    }));
    h.server.send(json!({
        "type": "message",
        "messageId": "srv-2",
        "content": "An agent joined the chat.",
        "metadata": {"type": "system"}
    }));

    let state = wait_for_state(&h.store, |s| s.messages.iter().any(|m| m.id == "srv-2")).await;
    let ai = state.messages.iter().find(|m| m.id == "srv-1").unwrap();
    assert_eq!(ai.kind, MessageType::Ai);
    assert_eq!(ai.timestamp.to_rfc3339(), "2025-03-01T10:00:00+00:00");
    let meta = ai.metadata.as_ref().unwrap();
    assert_eq!(meta.confidence, Some(0.7));
    assert_eq!(meta.response_time, Some(80));
    let system = state.messages.iter().find(|m| m.id == "srv-2").unwrap();
    assert_eq!(system.kind, MessageType::System);
    h.conn.shutdown().await;
}

#[tokio::test]
async fn outbound_envelopes_keep_kind_and_content() {
    let mut h = connected().await;

    let sent = h
        .conn
        .send_message(
            Envelope::new(EnvelopeKind::Message)
                .with_message_id("c-1")
                .with_content("hello there"),
        )
        .await;
    assert!(sent);
    let env = h.server.expect_kind("message").await;
    assert_eq!(env["messageId"], "c-1");
    assert_eq!(env["content"], "hello there");
    assert_eq!(env["sessionToken"], "sess-1");

    assert!(h.conn.send_typing_start().await);
    let typing = h.server.expect_kind("typing_start").await;
    assert_eq!(typing["metadata"]["sender"], "user");
    assert!(h.conn.send_typing_stop().await);
    h.server.expect_kind("typing_stop").await;
    h.conn.shutdown().await;
}

#[tokio::test]
async fn echoed_envelope_round_trips() {
    let mut h = connected().await;

    assert!(
        h.conn
            .send_message(
                Envelope::new(EnvelopeKind::Message)
                    .with_message_id("echo-1")
                    .with_content("round trip"),
            )
            .await
    );
    let env = h.server.expect_kind("message").await;
    h.server.send(env);

    let state = wait_for_state(&h.store, |s| s.messages.iter().any(|m| m.id == "echo-1")).await;
    let echoed = state.messages.iter().find(|m| m.id == "echo-1").unwrap();
    assert_eq!(echoed.content, "round trip");
    assert_eq!(h.conn.diagnostics().snapshot(), Default::default());
    h.conn.shutdown().await;
}

#[tokio::test]
async fn send_without_open_socket_returns_false() {
    let store = session_store();
    let conn = ConnectionManager::spawn(
        options("ws://127.0.0.1:9/ws"),
        Arc::new(CountingTokens::default()),
        store,
    );
    assert!(!conn.send_message(Envelope::new(EnvelopeKind::Message).with_content("x")).await);
    assert!(!conn.send_typing_start().await);
    conn.shutdown().await;
}

#[tokio::test]
async fn only_assistant_typing_is_shown() {
    let h = connected().await;

    h.server.send(json!({"type": "typing_start", "metadata": {"sender": "user"}}));
    sync(&h, "m-1").await;
    assert!(!h.store.snapshot().ui.is_typing);

    h.server.send(json!({"type": "typing_start", "metadata": {"sender": "ai"}}));
    wait_for_state(&h.store, |s| s.ui.is_typing).await;

    h.server.send(json!({"type": "typing_stop", "metadata": {"sender": "assistant"}}));
    wait_for_state(&h.store, |s| !s.ui.is_typing).await;
    h.conn.shutdown().await;
}

#[tokio::test]
async fn bad_frames_are_counted_and_dropped() {
    let h = connected().await;
    let before = h.store.snapshot().messages.len();

    h.server.send(json!({"type": "presence", "content": "online"}));
    h.server.send_raw("{not json");
    h.server.send(json!({"type": "message", "content": "no id"}));
    sync(&h, "m-1").await;

    let counts = h.conn.diagnostics().snapshot();
    assert_eq!(counts.unknown_kind, 1);
    assert_eq!(counts.malformed, 1);
    assert_eq!(counts.incomplete_message, 1);
    assert_eq!(h.store.snapshot().messages.len(), before + 1);
    assert!(h.conn.state().is_connected);
    h.conn.shutdown().await;
}

#[tokio::test]
async fn server_ping_is_answered() {
    let mut h = connected().await;
    h.server.send(json!({"type": "ping"}));
    let pong = h.server.expect_kind("pong").await;
    assert_eq!(pong["sessionToken"], "sess-1");
    h.conn.shutdown().await;
}

#[tokio::test]
async fn heartbeat_sends_pings() {
    let mut h = connected_with(|o| o.heartbeat_interval = Duration::from_millis(20)).await;
    let ping = h.server.expect_kind("ping").await;
    assert_eq!(ping["sessionToken"], "sess-1");
    h.conn.shutdown().await;
}

#[tokio::test]
async fn unanswered_heartbeats_force_reconnect() {
    let mut h = connected_with(|o| {
        o.heartbeat_interval = Duration::from_millis(20);
        o.pong_timeout_heartbeats = Some(1);
    })
    .await;

    h.server.next_handshake().await;
    h.server.expect_kind("join_session").await;
    assert!(h.tokens.calls() >= 2);
    h.conn.shutdown().await;
}

#[tokio::test]
async fn server_error_envelope_sets_ui_error() {
    let h = connected().await;
    h.server.send(json!({"type": "error", "content": "Session expired"}));
    let state = wait_for_state(&h.store, |s| s.ui.error.is_some()).await;
    assert_eq!(state.ui.error.as_deref(), Some("Session expired"));
    h.conn.shutdown().await;
}

#[tokio::test]
async fn normal_server_close_does_not_reconnect() {
    let h = connected().await;
    let mut rx = h.conn.subscribe();

    h.server.close(CloseCode::Normal);
    wait_for_conn(&mut rx, |s| s.phase == Phase::Idle).await;
    assert_eq!(h.store.snapshot().ui.connection, ConnectionStatus::Disconnected);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.tokens.calls(), 1);
    assert_eq!(h.conn.state().phase, Phase::Idle);
    h.conn.shutdown().await;
}

#[tokio::test]
async fn dropped_connection_reconnects_and_rejoins() {
    let mut h = connected().await;
    let mut rx = h.conn.subscribe();

    h.server.drop_connection();
    let uri = h.server.next_handshake().await;
    assert!(uri.contains("token=ws-token-1"), "{uri}");
    h.server.expect_kind("join_session").await;

    let state = wait_for_conn(&mut rx, |s| s.is_connected).await;
    assert_eq!(state.reconnect_attempts, 0);
    assert_eq!(h.tokens.calls(), 2);
    h.conn.shutdown().await;
}

#[tokio::test]
async fn reconnect_gives_up_after_the_cap() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let store = session_store();
    let tokens = Arc::new(CountingTokens::default());
    let conn = ConnectionManager::spawn(
        options(&format!("ws://127.0.0.1:{port}/ws")),
        tokens.clone(),
        store.clone(),
    );
    let mut rx = conn.subscribe();

    let err = conn.connect().await.unwrap_err();
    assert!(matches!(err, ChatError::WebSocket(_)));

    let state = wait_for_conn(&mut rx, |s| {
        s.phase == Phase::Exhausted
            && s
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("reconnect attempts"))
    })
    .await;
    assert_eq!(state.reconnect_attempts, 3);
    assert!(!state.is_connected);
    assert!(state.last_error.unwrap().contains("3 reconnect attempts"));
    assert_eq!(tokens.calls(), 4);

    let ui = store.snapshot().ui;
    assert_eq!(ui.connection, ConnectionStatus::Exhausted);
    assert!(ui.error.is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(tokens.calls(), 4);
    conn.shutdown().await;
}

#[tokio::test]
async fn token_failure_on_connect_stays_idle() {
    let store = session_store();
    let tokens = Arc::new(CountingTokens::failing());
    let conn = ConnectionManager::spawn(options("ws://127.0.0.1:9/ws"), tokens.clone(), store.clone());

    let err = conn.connect().await.unwrap_err();
    assert!(matches!(err, ChatError::AuthToken(_)));
    assert_eq!(conn.state().phase, Phase::Idle);
    assert!(store.snapshot().ui.error.is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(tokens.calls(), 1);
    conn.shutdown().await;
}

#[tokio::test]
async fn connect_without_session_is_rejected() {
    let store = ChatStore::new(Arc::new(ScriptedBackend::default()), quiet_options());
    let tokens = Arc::new(CountingTokens::default());
    let conn = ConnectionManager::spawn(options("ws://127.0.0.1:9/ws"), tokens.clone(), store);

    assert!(matches!(conn.connect().await, Err(ChatError::AuthToken(_))));
    assert_eq!(tokens.calls(), 0);
    conn.shutdown().await;
}

#[tokio::test]
async fn disconnect_leaves_session_first() {
    let mut h = connected().await;
    let mut rx = h.conn.subscribe();

    h.conn.disconnect().await;
    let leave = h.server.expect_kind("leave_session").await;
    assert_eq!(leave["sessionToken"], "sess-1");
    wait_for_conn(&mut rx, |s| s.phase == Phase::Idle).await;
    assert!(!h.conn.send_typing_stop().await);
    h.conn.shutdown().await;
}

#[tokio::test]
async fn clearing_the_session_disconnects() {
    let mut h = connected().await;
    let mut rx = h.conn.subscribe();

    h.store.clear_messages();
    h.server.expect_kind("leave_session").await;
    wait_for_conn(&mut rx, |s| s.phase == Phase::Idle).await;
    h.conn.shutdown().await;
}

#[tokio::test]
async fn manual_reconnect_opens_a_new_socket() {
    let mut h = connected().await;

    h.conn.reconnect().await.unwrap();
    h.server.expect_kind("leave_session").await;
    h.server.next_handshake().await;
    h.server.expect_kind("join_session").await;
    assert!(h.conn.state().is_connected);
    assert_eq!(h.tokens.calls(), 2);
    h.conn.shutdown().await;
}
