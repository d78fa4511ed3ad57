//! Transient UI flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Real-time connection status as shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No socket, no reconnect scheduled.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open.
    Connected,
    /// Waiting to retry after an abnormal closure.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Attempt cap reached; only a manual reconnect or a new session token
    /// restarts the cycle.
    Exhausted,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Exhausted => f.write_str("disconnected (retry limit reached)"),
        }
    }
}

/// UI flags. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    /// A REST send is in flight.
    pub is_loading: bool,
    /// The assistant is composing a reply.
    pub is_typing: bool,
    /// The real-time socket is open.
    pub is_connected: bool,
    /// Detailed connection status.
    pub connection: ConnectionStatus,
    /// User-visible error.
    pub error: Option<String>,
    /// Quick-reply buttons are visible.
    pub show_quick_replies: bool,
    /// The view should scroll to the newest message.
    pub scroll_to_bottom: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            is_loading: false,
            is_typing: false,
            is_connected: false,
            connection: ConnectionStatus::Disconnected,
            error: None,
            show_quick_replies: true,
            scroll_to_bottom: false,
        }
    }
}
