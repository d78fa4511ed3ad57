//! Conversation store.
//!
//! [`ChatStore`] is the single source of truth for messages, the session,
//! UI flags and escalation state. State lives in a [`watch`] channel; every
//! mutation is one `send_modify` patch, so nothing is written back from a
//! snapshot taken before an await. Subscribers call [`ChatStore::subscribe`].

mod escalation;
mod export;
pub mod fallback;
mod script;

pub use script::default_quick_replies;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::http::ChatBackend;
use crate::types::api::{ContextMessage, EscalationRequest, EscalationTicket, SendMessageRequest};
use crate::types::{
    ChatMode, ConnectionStatus, DeliveryStatus, EscalationOptions, EscalationState,
    EscalationStatus, Message, MessagePatch, MessageType, Session, UiState,
};
use escalation::StatusUpdate;

/// Everything subscribers observe.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    /// Active session.
    pub session: Option<Session>,
    /// Conversation mode.
    pub mode: ChatMode,
    /// Messages in insertion order.
    pub messages: Vec<Message>,
    /// Transient UI flags.
    pub ui: UiState,
    /// Human-handoff state.
    pub escalation: EscalationState,
}

/// Store tunables.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Delay between the greeting and the quick-reply message.
    pub quick_reply_delay: Duration,
    /// Trailing messages sent as escalation context.
    pub escalation_context_len: usize,
    /// Page size for the automatic history load.
    pub history_page_size: u32,
    /// Token to use when no session exists yet.
    pub session_token: Option<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

impl StoreOptions {
    /// Options derived from configuration.
    #[must_use]
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            quick_reply_delay: config.quick_reply_delay(),
            escalation_context_len: config.escalation_context_len,
            history_page_size: config.history_page_size,
            session_token: config
                .session_token
                .clone()
                .filter(|t| !t.trim().is_empty()),
        }
    }
}

/// Identity of the session a request was issued for.
#[derive(Debug, Clone)]
struct SessionTag {
    id: String,
    token: String,
    mode: ChatMode,
}

struct Inner {
    state: watch::Sender<ChatState>,
    backend: Arc<dyn ChatBackend>,
    options: StoreOptions,
    cancel: CancellationToken,
}

/// Handle to the conversation store. Clones share state.
#[derive(Clone)]
pub struct ChatStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStore")
            .field("options", &self.inner.options)
            .field("disposed", &self.inner.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Clears the busy flags when a send finishes, however it finishes.
struct BusyGuard<'a>(&'a ChatStore);

impl<'a> BusyGuard<'a> {
    fn engage(store: &'a ChatStore) -> Self {
        store.update(|s| {
            s.ui.is_loading = true;
            s.ui.is_typing = true;
        });
        Self(store)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.update(|s| {
            s.ui.is_loading = false;
            s.ui.is_typing = false;
        });
    }
}

impl ChatStore {
    /// Creates an empty store backed by `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, options: StoreOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: watch::Sender::new(ChatState::default()),
                backend,
                options,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Store tunables.
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    fn update(&self, f: impl FnOnce(&mut ChatState)) {
        self.inner.state.send_modify(f);
    }

    fn active_session(&self) -> Result<SessionTag> {
        let state = self.inner.state.borrow();
        let session = state
            .session
            .as_ref()
            .filter(|s| !s.session_token.is_empty())
            .ok_or(ChatError::SessionMissing)?;
        Ok(SessionTag {
            id: session.id.clone(),
            token: session.session_token.clone(),
            mode: state.mode,
        })
    }

    fn is_current(&self, tag: &SessionTag) -> bool {
        self.inner
            .state
            .borrow()
            .session
            .as_ref()
            .is_some_and(|s| s.id == tag.id)
    }

    // ── intents ──────────────────────────────────────────────────────────

    /// Sends a user message.
    ///
    /// Whitespace-only input is ignored. The user message is appended before
    /// the request is issued and never retracted. When the backend cannot
    /// answer, a local fallback reply is appended instead and `Ok` is
    /// returned.
    ///
    /// # Errors
    ///
    /// [`ChatError::SessionMissing`] without an active session. Any other
    /// failure is recorded in `ui.error` and a system message instead.
    pub async fn send_message(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Ok(());
        }
        let tag = self.active_session()?;

        let user = Message::user(content);
        let user_id = user.id.clone();
        self.update(|s| {
            s.messages.push(user);
            s.ui.show_quick_replies = false;
            s.ui.scroll_to_bottom = true;
        });

        self.deliver(&user_id, content, &tag, true).await
    }

    /// Re-sends a user message whose delivery failed.
    ///
    /// No new user message is appended and no fallback reply is generated.
    ///
    /// # Errors
    ///
    /// [`ChatError::Internal`] if `id` is not a failed user message,
    /// [`ChatError::SessionMissing`] without a session, or the request error.
    pub async fn retry_message(&self, id: &str) -> Result<()> {
        let content = {
            let state = self.inner.state.borrow();
            let msg = state
                .messages
                .iter()
                .find(|m| m.id == id)
                .ok_or_else(|| ChatError::Internal(format!("no message with id {id}")))?;
            if msg.kind != MessageType::User
                || msg.delivery_status != Some(DeliveryStatus::Failed)
            {
                return Err(ChatError::Internal(format!(
                    "message {id} is not a failed user message"
                )));
            }
            msg.content.clone()
        };
        let tag = self.active_session()?;

        self.update_message(id, MessagePatch::delivery(DeliveryStatus::Sending));
        self.deliver(id, &content, &tag, false).await
    }

    async fn deliver(
        &self,
        user_id: &str,
        content: &str,
        tag: &SessionTag,
        fallback: bool,
    ) -> Result<()> {
        let _busy = BusyGuard::engage(self);

        let req = SendMessageRequest {
            session_token: tag.token.clone(),
            message: content.to_string(),
            mode: tag.mode,
            context_data: None,
        };
        let result = self.inner.backend.send_message(req).await;

        if !self.is_current(tag) {
            tracing::debug!(session = %tag.id, "discarding reply for a replaced session");
            return Ok(());
        }

        match result {
            Ok(resp) => {
                let reply = resp.to_message();
                let recommended = resp.recommended_escalation().map(str::to_owned);
                self.update(|s| {
                    mark(s, user_id, DeliveryStatus::Sent);
                    s.messages.push(reply);
                    if let Some(info) = resp.session_info {
                        let mut session = Session::replaced_by(s.session.as_ref(), info);
                        session.mode = s.mode;
                        s.session = Some(session);
                    }
                    if let Some(reason) = recommended {
                        if !s.escalation.is_escalated {
                            s.escalation.reason = Some(reason);
                        }
                    }
                    s.ui.scroll_to_bottom = true;
                });
                Ok(())
            }
            Err(e) if e.is_request_failure() && fallback => {
                tracing::warn!(error = %e, "backend unavailable, answering locally");
                let reply = fallback::generate(content).into_message();
                self.update(|s| {
                    mark(s, user_id, DeliveryStatus::Failed);
                    s.messages.push(reply);
                    s.ui.scroll_to_bottom = true;
                });
                Ok(())
            }
            Err(e) if e.is_request_failure() => {
                tracing::warn!(error = %e, "retry failed");
                self.update(|s| mark(s, user_id, DeliveryStatus::Failed));
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "send failed");
                let text = e.to_string();
                self.update(|s| {
                    mark(s, user_id, DeliveryStatus::Failed);
                    s.messages.push(script::send_failed(&text));
                    s.ui.error = Some(text);
                    s.ui.scroll_to_bottom = true;
                });
                Ok(())
            }
        }
    }

    /// Starts a fresh session in `mode`.
    ///
    /// Clears messages and escalation, appends a greeting, schedules the
    /// quick-reply message and loads server-side history in the background.
    /// The session token is kept from the current session, else taken from
    /// [`StoreOptions::session_token`], else generated.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime.
    pub fn start_new_session(&self, mode: ChatMode) -> Session {
        let token = self
            .session_token()
            .or_else(|| self.inner.options.session_token.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = Session::new(token, mode);

        let fresh = session.clone();
        self.update(move |s| {
            s.messages.clear();
            s.escalation = EscalationState::default();
            s.session = Some(fresh);
            s.mode = mode;
            s.ui.error = None;
            s.ui.show_quick_replies = true;
            s.ui.scroll_to_bottom = true;
            s.messages.push(script::greeting(mode));
        });
        tracing::debug!(session = %session.id, mode = %mode, "session started");

        let tag = SessionTag {
            id: session.id.clone(),
            token: session.session_token.clone(),
            mode,
        };
        self.spawn_quick_replies(tag.clone());
        self.spawn_history_load(tag);

        session
    }

    fn spawn_quick_replies(&self, tag: SessionTag) {
        let store = self.clone();
        let cancel = self.inner.cancel.clone();
        let delay = self.inner.options.quick_reply_delay;
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            if store.is_current(&tag) {
                store.add_message(script::quick_reply_prompt());
            }
        });
    }

    fn spawn_history_load(&self, tag: SessionTag) {
        let store = self.clone();
        let cancel = self.inner.cancel.clone();
        let limit = self.inner.options.history_page_size;
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                res = store.load_history_for(&tag, 1, limit, false) => {
                    if let Err(e) = res {
                        tracing::debug!(error = %e, "history load failed");
                    }
                }
            }
        });
    }

    /// Loads a page of server-side history.
    ///
    /// Unlike other appends, server messages not already present (by id)
    /// are inserted ahead of local ones. Session info replaces the session
    /// and a reported mode becomes the active mode. Returns how many messages
    /// were inserted.
    ///
    /// # Errors
    ///
    /// [`ChatError::SessionMissing`] or the request error.
    pub async fn load_history(&self, page: u32, limit: u32) -> Result<usize> {
        let tag = self.active_session()?;
        self.load_history_for(&tag, page, limit, true).await
    }

    /// `adopt_mode` is false for the load that follows `start_new_session`,
    /// which must keep the mode just chosen.
    async fn load_history_for(
        &self,
        tag: &SessionTag,
        page: u32,
        limit: u32,
        adopt_mode: bool,
    ) -> Result<usize> {
        let resp = self
            .inner
            .backend
            .history(&tag.token, page, limit)
            .await?;
        if !self.is_current(tag) {
            tracing::debug!(session = %tag.id, "discarding history for a replaced session");
            return Ok(0);
        }

        let mut inserted = 0;
        self.update(|s| {
            let known: HashSet<&str> = s.messages.iter().map(|m| m.id.as_str()).collect();
            let mut merged: Vec<Message> = resp
                .messages
                .into_iter()
                .filter(|h| !known.contains(h.id.as_str()))
                .map(Message::from)
                .collect();
            drop(known);
            inserted = merged.len();
            merged.append(&mut s.messages);
            s.messages = merged;

            if let Some(info) = resp.session_info {
                s.session = Some(Session::replaced_by(s.session.as_ref(), info));
            }
            if let Some(mode) = resp.mode.filter(|_| adopt_mode) {
                s.mode = mode;
            }
            let mode = s.mode;
            if let Some(session) = s.session.as_mut() {
                session.mode = mode;
            }
        });
        tracing::debug!(inserted, page, "history loaded");
        Ok(inserted)
    }

    /// Requests a human agent.
    ///
    /// The trailing messages (see [`StoreOptions::escalation_context_len`])
    /// are sent as context. On success escalation becomes `pending` and a
    /// system message names the ticket.
    ///
    /// # Errors
    ///
    /// [`ChatError::SessionMissing`], [`ChatError::Escalation`] when an
    /// escalation is already open or closed, or the request error. State is
    /// untouched on error.
    pub async fn initiate_escalation(
        &self,
        reason: &str,
        options: EscalationOptions,
    ) -> Result<EscalationTicket> {
        let tag = self.active_session()?;
        let context = {
            let state = self.inner.state.borrow();
            let esc = &state.escalation;
            if esc.status.is_terminal() {
                return Err(ChatError::Escalation(format!(
                    "escalation already {}; start a new session to escalate again",
                    esc.status
                )));
            }
            if esc.is_escalated {
                return Err(ChatError::Escalation(format!(
                    "escalation already open (ticket {})",
                    esc.ticket_id.as_deref().unwrap_or("unknown")
                )));
            }
            let n = self.inner.options.escalation_context_len;
            let skip = state.messages.len().saturating_sub(n);
            state.messages[skip..]
                .iter()
                .map(ContextMessage::from)
                .collect()
        };

        let req = EscalationRequest {
            session_token: tag.token.clone(),
            reason: reason.to_string(),
            context,
            priority: options.priority,
            contact_info: options.contact_info,
        };
        let ticket = self
            .inner
            .backend
            .create_escalation(req)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "escalation request failed"))?;

        if !self.is_current(&tag) {
            tracing::debug!(session = %tag.id, "discarding escalation ticket for a replaced session");
            return Ok(ticket);
        }

        let t = ticket.clone();
        let reason = reason.to_string();
        self.update(move |s| {
            s.messages
                .push(script::escalated(&t.ticket_id, t.estimated_wait_time));
            s.escalation = EscalationState {
                is_escalated: true,
                reason: Some(reason),
                timestamp: Some(Utc::now()),
                ticket_id: Some(t.ticket_id),
                estimated_wait_time: t.estimated_wait_time,
                status: EscalationStatus::Pending,
                assigned_agent: None,
            };
            s.ui.scroll_to_bottom = true;
        });
        tracing::debug!(ticket = %ticket.ticket_id, "escalation created");
        Ok(ticket)
    }

    /// Polls the backend once and applies the reported escalation status.
    ///
    /// Without an active escalation the local status is returned and no
    /// request is made. A status change appends a system message.
    ///
    /// # Errors
    ///
    /// [`ChatError::SessionMissing`] or the request error.
    pub async fn refresh_escalation_status(&self) -> Result<EscalationStatus> {
        let tag = self.active_session()?;
        {
            let state = self.inner.state.borrow();
            if !state.escalation.is_escalated || state.escalation.status.is_terminal() {
                return Ok(state.escalation.status);
            }
        }

        let resp = self.inner.backend.escalation_status(&tag.token).await?;
        if !self.is_current(&tag) {
            return Ok(EscalationStatus::None);
        }

        let mut status = EscalationStatus::None;
        self.update(|s| {
            if !s.escalation.is_escalated {
                status = s.escalation.status;
                return;
            }
            let update = escalation::apply_status(&mut s.escalation, &resp);
            if let StatusUpdate::Changed { .. } = update {
                s.messages
                    .push(Message::system(escalation::describe(&s.escalation)));
                s.ui.scroll_to_bottom = true;
            }
            status = s.escalation.status;
        });
        Ok(status)
    }

    /// Polls escalation status every `interval` in the background.
    ///
    /// Stops at a terminal status, when escalation is cleared, or on
    /// [`ChatStore::dispose`]. Request errors are logged and polling goes on.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime.
    pub fn watch_escalation(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
                if !store.inner.state.borrow().escalation.is_escalated {
                    break;
                }
                match store.refresh_escalation_status().await {
                    Ok(status) if status.is_terminal() => break,
                    Ok(_) => {}
                    Err(ChatError::SessionMissing) => break,
                    Err(e) => tracing::warn!(error = %e, "escalation status poll failed"),
                }
            }
            tracing::debug!("escalation watch stopped");
        })
    }

    /// Switches the conversation mode. No network call.
    pub fn switch_mode(&self, mode: ChatMode) {
        self.update(|s| {
            s.mode = mode;
            if let Some(session) = s.session.as_mut() {
                session.mode = mode;
            }
            s.messages.push(script::mode_switched(mode));
            s.ui.scroll_to_bottom = true;
        });
    }

    // ── mutations ────────────────────────────────────────────────────────

    /// Appends a message.
    pub fn add_message(&self, message: Message) {
        self.update(|s| {
            s.messages.push(message);
            s.ui.scroll_to_bottom = true;
        });
    }

    /// Patches the message with `id`. Returns whether it was found.
    pub fn update_message(&self, id: &str, patch: MessagePatch) -> bool {
        let mut found = false;
        self.update(|s| {
            if let Some(msg) = s.messages.iter_mut().find(|m| m.id == id) {
                patch.apply(msg);
                found = true;
            }
        });
        found
    }

    /// Clears messages, the session and escalation.
    pub fn clear_messages(&self) {
        self.update(|s| {
            s.messages.clear();
            s.session = None;
            s.escalation = EscalationState::default();
            s.ui.show_quick_replies = true;
        });
    }

    /// Sets the loading flag.
    pub fn set_loading(&self, loading: bool) {
        self.update(|s| s.ui.is_loading = loading);
    }

    /// Sets the assistant-typing flag.
    pub fn set_typing(&self, typing: bool) {
        self.update(|s| s.ui.is_typing = typing);
    }

    /// Records a user-visible error.
    pub fn set_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|s| s.ui.error = Some(error));
    }

    /// Clears the user-visible error.
    pub fn clear_error(&self) {
        self.update(|s| s.ui.error = None);
    }

    /// Clears the error only if it is still `expected`.
    pub(crate) fn clear_error_if(&self, expected: &str) {
        self.inner.state.send_if_modified(|s| {
            if s.ui.error.as_deref() == Some(expected) {
                s.ui.error = None;
                true
            } else {
                false
            }
        });
    }

    /// Mirrors the connection manager's status.
    pub fn update_connection_status(&self, status: ConnectionStatus) {
        self.update(|s| {
            s.ui.connection = status;
            s.ui.is_connected = status == ConnectionStatus::Connected;
        });
    }

    /// Shows or hides quick replies.
    pub fn set_show_quick_replies(&self, show: bool) {
        self.update(|s| s.ui.show_quick_replies = show);
    }

    /// Marks the scroll request as handled.
    pub fn acknowledge_scroll(&self) {
        self.update(|s| s.ui.scroll_to_bottom = false);
    }

    // ── reads ────────────────────────────────────────────────────────────

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ChatState {
        self.inner.state.borrow().clone()
    }

    /// Change notifications; the receiver starts at the current state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.inner.state.subscribe()
    }

    /// Active session token, if any.
    #[must_use]
    pub fn session_token(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .session
            .as_ref()
            .map(|s| s.session_token.clone())
            .filter(|t| !t.is_empty())
    }

    /// Message with `id`.
    #[must_use]
    pub fn get_message_by_id(&self, id: &str) -> Option<Message> {
        self.find_message(|m| m.id == id)
    }

    /// Most recent user message.
    #[must_use]
    pub fn last_user_message(&self) -> Option<Message> {
        self.find_message(|m| m.kind == MessageType::User)
    }

    /// Most recent assistant message.
    #[must_use]
    pub fn last_ai_message(&self) -> Option<Message> {
        self.find_message(|m| m.kind == MessageType::Ai)
    }

    fn find_message(&self, pred: impl Fn(&Message) -> bool) -> Option<Message> {
        self.inner
            .state
            .borrow()
            .messages
            .iter()
            .rev()
            .find(|m| pred(m))
            .cloned()
    }

    /// Serializes the conversation for download.
    ///
    /// Only `confidence` and `responseTime` metadata are included; the
    /// session token is omitted.
    ///
    /// # Errors
    ///
    /// [`ChatError::Serde`] if serialization fails.
    pub fn export_chat_history(&self) -> Result<String> {
        let state = self.inner.state.borrow();
        serde_json::to_string_pretty(&export::ChatExport::of(&state))
            .map_err(|e| ChatError::Serde(e.to_string()))
    }

    /// Cancels background tasks. State stays readable.
    pub fn dispose(&self) {
        self.inner.cancel.cancel();
    }

    /// Whether [`ChatStore::dispose`] was called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Token cancelled by [`ChatStore::dispose`].
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }
}

fn mark(state: &mut ChatState, id: &str, status: DeliveryStatus) {
    if let Some(msg) = state.messages.iter_mut().find(|m| m.id == id) {
        msg.delivery_status = Some(status);
    }
}
