#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use mnp_chat::types::api::{
    EscalationRequest, EscalationStatusResponse, EscalationTicket, HistoryResponse,
    SendMessageRequest, SendMessageResponse,
};
use mnp_chat::{ApiErrorObject, ChatBackend, ChatError, ChatState, ChatStore, Result};
use mnp_chat::{ConnectionState, StoreOptions, TokenProvider};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn api_error(status: u16) -> ChatError {
    ChatError::Api(ApiErrorObject {
        status_code: Some(status),
        message: "unavailable".into(),
        error: None,
    })
}

pub fn reply(text: &str) -> SendMessageResponse {
    serde_json::from_value(serde_json::json!({
        "message": text,
        "metadata": {"confidenceScore": 0.9, "responseTime": 120}
    }))
    .unwrap()
}

/// Backend double answering from per-endpoint queues.
///
/// Empty queues answer with a 503 for sends and escalations, an empty
/// history page, and an error for status polls.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<SendMessageResponse>>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
    history: Mutex<Option<HistoryResponse>>,
    tickets: Mutex<VecDeque<Result<EscalationTicket>>>,
    statuses: Mutex<VecDeque<EscalationStatusResponse>>,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub escalations: Mutex<Vec<EscalationRequest>>,
    pub status_polls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn push_reply(&self, r: Result<SendMessageResponse>) {
        self.replies.lock().unwrap().push_back(r);
    }

    /// The next `send_message` waits until the returned sender fires.
    pub fn hold_next_reply(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn set_history(&self, h: HistoryResponse) {
        *self.history.lock().unwrap() = Some(h);
    }

    pub fn push_ticket(&self, t: Result<EscalationTicket>) {
        self.tickets.lock().unwrap().push_back(t);
    }

    pub fn push_status(&self, s: EscalationStatusResponse) {
        self.statuses.lock().unwrap().push_back(s);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn send_message(&self, req: SendMessageRequest) -> Result<SendMessageResponse> {
        self.sent.lock().unwrap().push(req);
        let hold = self.hold.lock().unwrap().take();
        if let Some(rx) = hold {
            let _ = rx.await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(api_error(503)))
    }

    async fn history(&self, _: &str, _: u32, _: u32) -> Result<HistoryResponse> {
        Ok(self.history.lock().unwrap().clone().unwrap_or_default())
    }

    async fn create_escalation(&self, req: EscalationRequest) -> Result<EscalationTicket> {
        self.escalations.lock().unwrap().push(req);
        self.tickets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(api_error(500)))
    }

    async fn escalation_status(&self, _: &str) -> Result<EscalationStatusResponse> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| api_error(502))
    }
}

/// Token provider double that counts calls.
#[derive(Default)]
pub struct CountingTokens {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingTokens {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for CountingTokens {
    async fn ws_token(&self, _session_token: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ChatError::AuthToken("denied".into()));
        }
        Ok(format!("ws-token-{n}"))
    }
}

pub fn store_with(backend: Arc<ScriptedBackend>, options: StoreOptions) -> ChatStore {
    ChatStore::new(backend, options)
}

/// Store options with a quick-reply delay long enough to stay out of the way.
pub fn quiet_options() -> StoreOptions {
    StoreOptions {
        quick_reply_delay: Duration::from_secs(3600),
        ..StoreOptions::default()
    }
}

pub async fn wait_for_state(store: &ChatStore, pred: impl FnMut(&ChatState) -> bool) -> ChatState {
    let mut rx = store.subscribe();
    let state = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for store state")
        .expect("store dropped");
    state.clone()
}

pub async fn wait_for_conn(
    rx: &mut watch::Receiver<ConnectionState>,
    pred: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    let state = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for connection state")
        .expect("connection task ended");
    state.clone()
}

/// What the test server does next on the open connection.
pub enum ServerAction {
    Send(String),
    Close(CloseCode),
    Drop,
}

/// Plain `ws://` server on a loopback port serving one connection at a time.
pub struct WsServer {
    pub url: String,
    inbound: mpsc::UnboundedReceiver<String>,
    uris: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<ServerAction>,
}

impl WsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (in_tx, inbound) = mpsc::unbounded_channel();
        let (uri_tx, uris) = mpsc::unbounded_channel();
        let (outbound, mut out_rx) = mpsc::unbounded_channel::<ServerAction>();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let uri_tx = uri_tx.clone();
                let callback = move |req: &Request, resp: Response| {
                    let _ = uri_tx.send(req.uri().to_string());
                    Ok::<Response, ErrorResponse>(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                loop {
                    tokio::select! {
                        frame = ws.next() => match frame {
                            Some(Ok(WsMessage::Text(t))) => {
                                let _ = in_tx.send(t.as_str().to_owned());
                            }
                            Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        },
                        action = out_rx.recv() => match action {
                            Some(ServerAction::Send(text)) => {
                                if ws.send(WsMessage::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            Some(ServerAction::Close(code)) => {
                                let frame = CloseFrame { code, reason: "server close".into() };
                                let _ = ws.close(Some(frame)).await;
                                break;
                            }
                            Some(ServerAction::Drop) => break,
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}/ws"),
            inbound,
            uris,
            outbound,
        }
    }

    pub fn send(&self, envelope: serde_json::Value) {
        self.send_raw(envelope.to_string());
    }

    pub fn send_raw(&self, text: impl Into<String>) {
        self.outbound.send(ServerAction::Send(text.into())).unwrap();
    }

    pub fn close(&self, code: CloseCode) {
        self.outbound.send(ServerAction::Close(code)).unwrap();
    }

    pub fn drop_connection(&self) {
        self.outbound.send(ServerAction::Drop).unwrap();
    }

    /// Next request URI of an accepted handshake.
    pub async fn next_handshake(&mut self) -> String {
        tokio::time::timeout(WAIT, self.uris.recv())
            .await
            .expect("timed out waiting for handshake")
            .expect("server stopped")
    }

    /// Next envelope received from the client, parsed.
    pub async fn next_envelope(&mut self) -> serde_json::Value {
        let text = tokio::time::timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server stopped");
        serde_json::from_str(&text).unwrap()
    }

    /// Next envelope of `kind`, skipping heartbeats and anything else.
    pub async fn expect_kind(&mut self, kind: &str) -> serde_json::Value {
        loop {
            let env = self.next_envelope().await;
            if env["type"] == kind {
                return env;
            }
        }
    }
}
