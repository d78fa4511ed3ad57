//! Error types for `mnp_chat`.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for `mnp_chat` operations.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur in the chat client core.
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP transport error (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Non-success response from the backend.
    #[error("API error: {0:?}")]
    Api(ApiErrorObject),

    /// Response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serde(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// An operation needing an active session was called without one.
    #[error("No active session: start a session before sending or escalating")]
    SessionMissing,

    /// Escalation request rejected by local state (already open or closed).
    #[error("Escalation error: {0}")]
    Escalation(String),

    /// The WebSocket transport token could not be obtained.
    #[error("Failed to obtain WebSocket token: {0}")]
    AuthToken(String),

    /// WebSocket handshake or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The connection task is no longer running.
    #[error("Connection task is not running")]
    ConnectionClosed,

    /// Internal state error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error object returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorObject {
    /// HTTP status code.
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
    /// Machine-readable error kind.
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatError {
    /// Whether the HTTP layer should retry the request.
    ///
    /// Retryable errors are rate limits (429), timeouts (408), conflicts (409),
    /// server errors (5xx) and connect/timeout transport failures.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api(obj) => obj
                .status_code
                .is_some_and(crate::retry::is_retryable_status),
            Self::Reqwest(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether this error means the backend could not serve the request.
    ///
    /// These are the failures `send_message` degrades into a local fallback
    /// reply for; everything else is reported as a failed send.
    #[must_use]
    pub const fn is_request_failure(&self) -> bool {
        matches!(self, Self::Reqwest(_) | Self::Api(_) | Self::Serde(_))
    }

    /// HTTP status code, if the backend answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(obj) => obj.status_code,
            Self::Reqwest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Maps a serde deserialization error to a `ChatError` with a body snippet.
#[must_use]
pub fn map_deser(e: &serde_json::Error, body: &[u8]) -> ChatError {
    let snippet = String::from_utf8_lossy(&body[..body.len().min(400)]).to_string();
    ChatError::Serde(format!("{e}: {snippet}"))
}

/// Deserializes an API error from a non-success response body.
///
/// Falls back to a truncated plain-text body when the payload is not JSON.
#[must_use]
pub fn deserialize_api_error(status: StatusCode, body: &[u8]) -> ChatError {
    let status_code = Some(status.as_u16());

    if let Ok(mut obj) = serde_json::from_slice::<ApiErrorObject>(body) {
        obj.status_code = status_code;
        return ChatError::Api(obj);
    }

    ChatError::Api(ApiErrorObject {
        status_code,
        message: String::from_utf8_lossy(&body[..body.len().min(400)]).into_owned(),
        error: Some(format!("http_{}", status.as_u16())),
    })
}
