//! Client configuration.
//!
//! [`ChatConfig`] carries every tunable of the REST client, the connection
//! manager and the store. All fields are defaulted, so a partial JSON file
//! deserializes cleanly. See [`loader::load_merged`] for precedence.

/// Layered file + environment loading
pub mod loader;
/// RFC 7396 merge patch
pub mod merge;
/// Advisory validation
pub mod validation;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default REST base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
/// Default WebSocket URL.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// Client configuration.
///
/// Durations are stored in milliseconds so the JSON file stays flat; use the
/// `Duration` accessors in code. `Debug` redacts `api_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatConfig {
    /// REST base URL.
    pub api_url: String,

    /// WebSocket endpoint.
    pub ws_url: String,

    /// Bearer credential for the REST API. Env-only, never serialized.
    #[serde(skip)]
    pub api_key: Option<SecretString>,

    /// Session token to resume instead of generating a fresh one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// Interval between `ping` envelopes.
    pub heartbeat_interval_ms: u64,

    /// First reconnect delay; doubles per attempt.
    pub reconnect_base_ms: u64,

    /// Upper bound for a single reconnect delay.
    pub reconnect_max_delay_ms: u64,

    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Consecutive unanswered pings before the socket is treated as dead.
    /// `None` disables the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_heartbeats: Option<u32>,

    /// WebSocket handshake timeout.
    pub connect_timeout_ms: u64,

    /// REST request timeout.
    pub request_timeout_ms: u64,

    /// Delay between the greeting and the quick-reply message.
    pub quick_reply_delay_ms: u64,

    /// Trailing messages sent as escalation context.
    pub escalation_context_len: usize,

    /// Page size for history loads.
    pub history_page_size: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            ws_url: DEFAULT_WS_URL.into(),
            api_key: None,
            session_token: None,
            heartbeat_interval_ms: 30_000,
            reconnect_base_ms: 3_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
            pong_timeout_heartbeats: None,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            quick_reply_delay_ms: 1_000,
            escalation_context_len: 5,
            history_page_size: 50,
        }
    }
}

impl ChatConfig {
    /// Sets the REST base URL.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Sets the WebSocket endpoint.
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Sets the session token to resume.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// First reconnect delay.
    #[must_use]
    pub const fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    /// Reconnect delay cap.
    #[must_use]
    pub const fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    /// Handshake timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// REST request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Greeting to quick-reply delay.
    #[must_use]
    pub const fn quick_reply_delay(&self) -> Duration {
        Duration::from_millis(self.quick_reply_delay_ms)
    }
}
