//! WebSocket connection manager.
//!
//! One background task owns the socket, the heartbeat interval and the
//! reconnect deadline. Public calls are commands sent to that task, so no
//! timer ever acts on a stale snapshot of the connection.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::codec::{self, DecodeError, Envelope, EnvelopeKind};
use super::diagnostics::ProtocolDiagnostics;
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::http::TokenProvider;
use crate::retry;
use crate::store::ChatStore;
use crate::types::{ConnectionStatus, Message, MessageMetadata};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection tunables.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// WebSocket endpoint; credentials are appended as query parameters.
    pub ws_url: String,
    /// Interval between `ping` envelopes. Zero disables the heartbeat.
    pub heartbeat_interval: Duration,
    /// First reconnect delay.
    pub reconnect_base: Duration,
    /// Reconnect delay cap.
    pub reconnect_max_delay: Duration,
    /// Attempts before the manager gives up.
    pub max_reconnect_attempts: u32,
    /// Unanswered pings tolerated before the socket is treated as dead.
    pub pong_timeout_heartbeats: Option<u32>,
    /// Handshake timeout.
    pub connect_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

impl ConnectionOptions {
    /// Options derived from configuration.
    #[must_use]
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            heartbeat_interval: config.heartbeat_interval(),
            reconnect_base: config.reconnect_base(),
            reconnect_max_delay: config.reconnect_max_delay(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            pong_timeout_heartbeats: config.pong_timeout_heartbeats,
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// Lifecycle phase of the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// No socket and nothing scheduled.
    #[default]
    Idle,
    /// Token fetch or handshake in progress.
    Connecting,
    /// Socket open.
    Open,
    /// Waiting for the reconnect deadline.
    Reconnecting,
    /// Attempt cap reached.
    Exhausted,
}

/// Observable connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// Socket open.
    pub is_connected: bool,
    /// Token fetch or handshake in progress.
    pub is_connecting: bool,
    /// Reconnect attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// Most recent failure.
    pub last_error: Option<String>,
    /// Detailed phase.
    pub phase: Phase,
}

enum Command {
    Connect(oneshot::Sender<Result<()>>),
    Disconnect(oneshot::Sender<()>),
    Reconnect(oneshot::Sender<Result<()>>),
    Send(Envelope, oneshot::Sender<bool>),
}

/// Handle to the connection task.
///
/// Dropping the handle cancels the task, which leaves the session and closes
/// the socket with code 1000.
pub struct ConnectionManager {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    diagnostics: Arc<ProtocolDiagnostics>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Spawns the connection task. The manager starts idle.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn spawn(
        options: ConnectionOptions,
        tokens: Arc<dyn TokenProvider>,
        store: ChatStore,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let diagnostics = Arc::new(ProtocolDiagnostics::default());
        let cancel = CancellationToken::new();

        let actor = Actor {
            opts: options,
            tokens,
            store,
            diagnostics: Arc::clone(&diagnostics),
            state_tx,
            cancel: cancel.clone(),
            socket: None,
            heartbeat: None,
            reconnect_at: None,
            attempts: 0,
            missed_pongs: 0,
            phase: Phase::Idle,
            active_token: None,
            last_error: None,
        };
        let task = tokio::spawn(actor.run(cmd_rx));

        Self {
            commands: cmd_tx,
            state: state_rx,
            diagnostics,
            cancel,
            task: Some(task),
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ChatError::ConnectionClosed)?;
        rx.await.map_err(|_| ChatError::ConnectionClosed)
    }

    /// Opens the socket for the store's session token. No-op when open.
    ///
    /// A failed handshake still schedules automatic reconnection.
    ///
    /// # Errors
    ///
    /// [`ChatError::AuthToken`] without a session token or when the token
    /// provider fails (nothing is scheduled in that case);
    /// [`ChatError::WebSocket`] when the handshake fails.
    pub async fn connect(&self) -> Result<()> {
        self.request(Command::Connect).await?
    }

    /// Leaves the session and closes the socket normally. Cancels any
    /// scheduled reconnect.
    pub async fn disconnect(&self) {
        if self.request(Command::Disconnect).await.is_err() {
            tracing::debug!("disconnect after connection task ended");
        }
    }

    /// Disconnects, then connects immediately. Clears an exhausted state.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionManager::connect`].
    pub async fn reconnect(&self) -> Result<()> {
        self.request(Command::Reconnect).await?
    }

    /// Sends an envelope. Returns `false` unless the socket is open and the
    /// write succeeded.
    pub async fn send_message(&self, envelope: Envelope) -> bool {
        self.request(|tx| Command::Send(envelope, tx))
            .await
            .unwrap_or(false)
    }

    /// Announces that the user started typing.
    pub async fn send_typing_start(&self) -> bool {
        let envelope =
            Envelope::new(EnvelopeKind::TypingStart).with_metadata(json!({"sender": "user"}));
        self.send_message(envelope).await
    }

    /// Announces that the user stopped typing.
    pub async fn send_typing_stop(&self) -> bool {
        let envelope =
            Envelope::new(EnvelopeKind::TypingStop).with_metadata(json!({"sender": "user"}));
        self.send_message(envelope).await
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Connection state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Dropped-frame counters.
    #[must_use]
    pub fn diagnostics(&self) -> Arc<ProtocolDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Cancels the connection task.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    /// Cancels the connection task and waits for it to close the socket.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "connection task panicked");
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Manual,
    Scheduled,
}

enum Wake {
    Shutdown,
    Command(Command),
    Frame(Option<std::result::Result<WsMessage, WsError>>),
    Heartbeat,
    ReconnectDue,
    StoreChanged,
}

struct Actor {
    opts: ConnectionOptions,
    tokens: Arc<dyn TokenProvider>,
    store: ChatStore,
    diagnostics: Arc<ProtocolDiagnostics>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    socket: Option<Socket>,
    heartbeat: Option<Interval>,
    reconnect_at: Option<Instant>,
    attempts: u32,
    missed_pongs: u32,
    phase: Phase,
    active_token: Option<String>,
    last_error: Option<String>,
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<std::result::Result<WsMessage, WsError>> {
    match socket {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn socket_url(base: &str, ws_token: &str, session_token: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("token", ws_token)
        .append_pair("sessionToken", session_token);
    Ok(url)
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut session_rx = self.store.subscribe();
        let mut seen_token = self.store.session_token();

        loop {
            let wake = tokio::select! {
                () = self.cancel.cancelled() => Wake::Shutdown,
                cmd = commands.recv() => cmd.map_or(Wake::Shutdown, Wake::Command),
                frame = next_frame(&mut self.socket) => Wake::Frame(frame),
                () = tick(&mut self.heartbeat) => Wake::Heartbeat,
                () = deadline(self.reconnect_at) => Wake::ReconnectDue,
                changed = session_rx.changed() => {
                    if changed.is_ok() { Wake::StoreChanged } else { Wake::Shutdown }
                }
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Command(cmd) => self.handle_command(cmd).await,
                Wake::Frame(frame) => self.handle_frame(frame).await,
                Wake::Heartbeat => self.heartbeat().await,
                Wake::ReconnectDue => {
                    self.reconnect_at = None;
                    tracing::debug!(attempt = self.attempts, "reconnect attempt");
                    if let Err(e) = self.attempt(Origin::Scheduled).await {
                        tracing::debug!(error = %e, "reconnect attempt failed");
                    }
                }
                Wake::StoreChanged => {
                    let token = session_rx
                        .borrow_and_update()
                        .session
                        .as_ref()
                        .map(|s| s.session_token.clone())
                        .filter(|t| !t.is_empty());
                    if token != seen_token {
                        seen_token.clone_from(&token);
                        self.follow_token(token).await;
                    }
                }
            }
        }

        if tokio::time::timeout(Duration::from_secs(2), self.close_gracefully())
            .await
            .is_err()
        {
            tracing::debug!("close handshake timed out during shutdown");
        }
        tracing::debug!("connection task stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(reply) => {
                let res = if self.socket.is_some() {
                    Ok(())
                } else {
                    self.reconnect_at = None;
                    self.attempts = 0;
                    self.attempt(Origin::Manual).await
                };
                let _ = reply.send(res);
            }
            Command::Disconnect(reply) => {
                self.close_gracefully().await;
                let _ = reply.send(());
            }
            Command::Reconnect(reply) => {
                self.close_gracefully().await;
                let res = self.attempt(Origin::Manual).await;
                let _ = reply.send(res);
            }
            Command::Send(mut envelope, reply) => {
                let sent = if self.phase == Phase::Open {
                    if envelope.session_token.is_none() {
                        envelope.session_token.clone_from(&self.active_token);
                    }
                    self.send_envelope(&envelope).await
                } else {
                    false
                };
                let _ = reply.send(sent);
            }
        }
    }

    /// Follows a session-token change in the store.
    async fn follow_token(&mut self, token: Option<String>) {
        if self.phase == Phase::Idle {
            return;
        }
        match token {
            None => {
                tracing::debug!("session token cleared, disconnecting");
                self.close_gracefully().await;
            }
            Some(t) if Some(&t) != self.active_token.as_ref() => {
                tracing::debug!("session token changed, reconnecting");
                self.close_gracefully().await;
                if let Err(e) = self.attempt(Origin::Manual).await {
                    tracing::debug!(error = %e, "reconnect for new session failed");
                }
            }
            Some(_) => {}
        }
    }

    async fn attempt(&mut self, origin: Origin) -> Result<()> {
        match self.open().await {
            Ok(()) => Ok(()),
            Err(ChatError::ConnectionClosed) => Err(ChatError::ConnectionClosed),
            Err(e) => {
                self.report(e.to_string());
                if matches!(e, ChatError::AuthToken(_)) && origin == Origin::Manual {
                    self.set_phase(Phase::Idle);
                } else {
                    self.schedule_reconnect();
                }
                Err(e)
            }
        }
    }

    async fn open(&mut self) -> Result<()> {
        let session_token = self
            .store
            .session_token()
            .ok_or_else(|| ChatError::AuthToken("no active session token".into()))?;
        self.set_phase(Phase::Connecting);

        let fetch = self.tokens.ws_token(&session_token);
        let ws_token = tokio::select! {
            () = self.cancel.cancelled() => Err(ChatError::ConnectionClosed),
            t = fetch => t.map_err(|e| match e {
                ChatError::AuthToken(_) => e,
                other => ChatError::AuthToken(other.to_string()),
            }),
        }?;

        let url = socket_url(&self.opts.ws_url, &ws_token, &session_token)?;
        tracing::debug!(endpoint = %self.opts.ws_url, "opening socket");

        let timeout = self.opts.connect_timeout;
        let handshake = tokio::time::timeout(timeout, connect_async(url.as_str()));
        let (socket, _response) = tokio::select! {
            () = self.cancel.cancelled() => Err(ChatError::ConnectionClosed),
            r = handshake => match r {
                Ok(Ok(pair)) => Ok(pair),
                Ok(Err(e)) => Err(ChatError::WebSocket(e.to_string())),
                Err(_) => Err(ChatError::WebSocket(format!(
                    "handshake timed out after {}ms",
                    timeout.as_millis()
                ))),
            },
        }?;

        self.on_open(socket, session_token).await;
        Ok(())
    }

    async fn on_open(&mut self, socket: Socket, session_token: String) {
        self.socket = Some(socket);
        self.attempts = 0;
        self.missed_pongs = 0;
        self.reconnect_at = None;
        self.heartbeat = self.heartbeat_timer();
        if let Some(err) = self.last_error.take() {
            self.store.clear_error_if(&err);
        }
        self.active_token = Some(session_token.clone());
        self.set_phase(Phase::Open);
        tracing::debug!("socket open");

        let join = Envelope::new(EnvelopeKind::JoinSession).with_session(session_token);
        self.send_envelope(&join).await;
    }

    fn heartbeat_timer(&self) -> Option<Interval> {
        let period = self.opts.heartbeat_interval;
        if period.is_zero() {
            return None;
        }
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(interval)
    }

    fn drop_socket(&mut self) {
        self.socket = None;
        self.heartbeat = None;
        self.missed_pongs = 0;
    }

    fn schedule_reconnect(&mut self) {
        self.drop_socket();
        if self.attempts >= self.opts.max_reconnect_attempts {
            self.reconnect_at = None;
            tracing::warn!(attempts = self.attempts, "reconnect attempts exhausted");
            self.set_phase(Phase::Exhausted);
            self.report(format!(
                "Connection lost after {} reconnect attempts. Reconnect manually to try again.",
                self.attempts
            ));
            return;
        }

        self.attempts += 1;
        let delay = retry::reconnect_delay(
            self.opts.reconnect_base,
            self.attempts,
            self.opts.reconnect_max_delay,
        );
        self.reconnect_at = Some(Instant::now() + delay);
        tracing::debug!(attempt = self.attempts, ?delay, "reconnect scheduled");
        self.set_phase(Phase::Reconnecting);
    }

    async fn close_gracefully(&mut self) {
        self.reconnect_at = None;
        self.heartbeat = None;
        if self.socket.is_some() {
            let mut leave = Envelope::new(EnvelopeKind::LeaveSession);
            leave.session_token.clone_from(&self.active_token);
            self.send_envelope(&leave).await;
        }
        if let Some(mut socket) = self.socket.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "client disconnect".into(),
            };
            if let Err(e) = socket.close(Some(frame)).await {
                tracing::debug!(error = %e, "close handshake failed");
            }
        }
        self.drop_socket();
        self.attempts = 0;
        if self.phase != Phase::Idle {
            self.set_phase(Phase::Idle);
        }
    }

    async fn heartbeat(&mut self) {
        if let Some(limit) = self.opts.pong_timeout_heartbeats {
            if self.missed_pongs >= limit {
                tracing::warn!(missed = self.missed_pongs, "heartbeat unanswered, dropping socket");
                self.report(format!(
                    "No heartbeat reply after {} pings",
                    self.missed_pongs
                ));
                self.schedule_reconnect();
                return;
            }
        }
        let mut ping = Envelope::new(EnvelopeKind::Ping);
        ping.session_token.clone_from(&self.active_token);
        if self.send_envelope(&ping).await {
            self.missed_pongs = self.missed_pongs.saturating_add(1);
        }
    }

    async fn send_envelope(&mut self, envelope: &Envelope) -> bool {
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };
        let text = match codec::encode(envelope) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, kind = %envelope.kind, "envelope not serializable");
                return false;
            }
        };
        match socket.send(WsMessage::Text(text.into())).await {
            Ok(()) => true,
            Err(e) => {
                self.report(format!("Failed to send {}: {e}", envelope.kind));
                false
            }
        }
    }

    async fn handle_frame(&mut self, frame: Option<std::result::Result<WsMessage, WsError>>) {
        match frame {
            Some(Ok(WsMessage::Text(text))) => self.dispatch(text.as_str()).await,
            Some(Ok(WsMessage::Close(frame))) => {
                if frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal) {
                    tracing::debug!("server closed the socket normally");
                    self.drop_socket();
                    self.attempts = 0;
                    self.set_phase(Phase::Idle);
                } else {
                    let code = frame.map_or(1005, |f| u16::from(f.code));
                    self.report(format!("Connection closed unexpectedly (code {code})"));
                    self.schedule_reconnect();
                }
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                self.report(format!("WebSocket error: {e}"));
                self.schedule_reconnect();
            }
            None => {
                self.report("Connection closed unexpectedly (code 1006)".to_string());
                self.schedule_reconnect();
            }
        }
    }

    async fn dispatch(&mut self, text: &str) {
        let envelope = match codec::decode(text) {
            Ok(env) => env,
            Err(DecodeError::Malformed(e)) => {
                self.diagnostics.record_malformed(&e);
                return;
            }
            Err(DecodeError::UnknownKind(kind)) => {
                self.diagnostics.record_unknown_kind(&kind);
                return;
            }
        };

        match envelope.kind {
            EnvelopeKind::Message => self.accept_message(envelope),
            EnvelopeKind::TypingStart | EnvelopeKind::TypingStop => {
                if envelope.is_from_assistant() {
                    self.store
                        .set_typing(envelope.kind == EnvelopeKind::TypingStart);
                }
            }
            EnvelopeKind::Ping => {
                let mut pong = Envelope::new(EnvelopeKind::Pong);
                pong.session_token.clone_from(&self.active_token);
                self.send_envelope(&pong).await;
            }
            EnvelopeKind::Pong => {
                self.missed_pongs = 0;
            }
            EnvelopeKind::JoinSession | EnvelopeKind::LeaveSession => {
                tracing::debug!(kind = %envelope.kind, "session presence");
            }
            EnvelopeKind::Error => {
                let text = envelope
                    .content
                    .unwrap_or_else(|| "The server reported an error".into());
                tracing::warn!(error = %text, "server error envelope");
                self.store.set_error(text);
            }
        }
    }

    fn accept_message(&self, envelope: Envelope) {
        let is_system = envelope.meta_str("type") == Some("system");
        let confidence = envelope.meta_f64("confidence");
        let response_time = envelope
            .metadata
            .as_ref()
            .and_then(|m| m.get("responseTime"))
            .and_then(serde_json::Value::as_u64);

        let (id, content) = match (envelope.message_id, envelope.content) {
            (Some(id), Some(content)) => (id, content),
            (id, content) => {
                self.diagnostics
                    .record_incomplete_message(id.is_some(), content.is_some());
                return;
            }
        };

        let mut msg = if is_system {
            Message::system(content)
        } else {
            Message::ai(content)
        }
        .with_id(id);
        if let Some(ts) = envelope.timestamp {
            msg.timestamp = ts;
        }
        if confidence.is_some() || response_time.is_some() {
            msg.metadata = Some(MessageMetadata {
                confidence,
                response_time,
                ..MessageMetadata::default()
            });
        }

        self.store.add_message(msg);
        self.store.set_typing(false);
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        let status = match phase {
            Phase::Idle => ConnectionStatus::Disconnected,
            Phase::Connecting => ConnectionStatus::Connecting,
            Phase::Open => ConnectionStatus::Connected,
            Phase::Reconnecting => ConnectionStatus::Reconnecting {
                attempt: self.attempts,
            },
            Phase::Exhausted => ConnectionStatus::Exhausted,
        };
        self.store.update_connection_status(status);
        self.publish();
    }

    fn report(&mut self, error: String) {
        tracing::warn!(error = %error, "connection error");
        self.store.set_error(error.clone());
        self.last_error = Some(error);
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(ConnectionState {
            is_connected: self.phase == Phase::Open,
            is_connecting: self.phase == Phase::Connecting,
            reconnect_attempts: self.attempts,
            last_error: self.last_error.clone(),
            phase: self.phase,
        });
    }
}
