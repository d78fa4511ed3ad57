//! WebSocket envelope codec.
//!
//! Wire shape: `{type, sessionToken?, messageId?, content?, metadata?,
//! timestamp}`. Decoding accepts only the closed set of [`EnvelopeKind`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Envelope kinds understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// Chat message from the server.
    Message,
    /// Someone started typing.
    TypingStart,
    /// Someone stopped typing.
    TypingStop,
    /// Heartbeat probe.
    Ping,
    /// Heartbeat answer.
    Pong,
    /// Session join notice.
    JoinSession,
    /// Session leave notice.
    LeaveSession,
    /// Server-reported error.
    Error,
}

impl EnvelopeKind {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::JoinSession => "join_session",
            Self::LeaveSession => "leave_session",
            Self::Error => "error",
        }
    }

    /// Parses a wire name; `None` for anything outside the closed set.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "message" => Self::Message,
            "typing_start" => Self::TypingStart,
            "typing_stop" => Self::TypingStop,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "join_session" => Self::JoinSession,
            "leave_session" => Self::LeaveSession,
            "error" => Self::Error,
            _ => return None,
        })
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded or to-be-sent envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Envelope kind.
    pub kind: EnvelopeKind,
    /// Session the envelope belongs to.
    pub session_token: Option<String>,
    /// Message id, for `message` envelopes.
    pub message_id: Option<String>,
    /// Text payload.
    pub content: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<Value>,
    /// Sender timestamp; `None` when absent or unparseable.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Bare envelope of the given kind.
    #[must_use]
    pub const fn new(kind: EnvelopeKind) -> Self {
        Self {
            kind,
            session_token: None,
            message_id: None,
            content: None,
            metadata: None,
            timestamp: None,
        }
    }

    /// Sets the session token.
    #[must_use]
    pub fn with_session(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Sets the text payload.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the message id.
    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets the metadata object.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// String field of `metadata`, if present.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }

    /// Numeric field of `metadata`, if present.
    #[must_use]
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        self.metadata.as_ref()?.get(key)?.as_f64()
    }

    /// Whether `metadata.sender` names the assistant.
    #[must_use]
    pub fn is_from_assistant(&self) -> bool {
        matches!(self.meta_str("sender"), Some("ai" | "assistant"))
    }
}

/// Why an inbound frame was rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not JSON, or not an envelope object.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// Valid envelope with a kind outside the closed set.
    #[error("unknown envelope kind: {0}")]
    UnknownKind(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Value>,
    timestamp: DateTime<Utc>,
}

/// Serializes an envelope, stamping the current instant.
///
/// Any timestamp already on `env` is replaced.
///
/// # Errors
///
/// Returns the serializer error; only reachable with non-finite metadata numbers.
pub fn encode(env: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WireEnvelope {
        kind: env.kind.as_str(),
        session_token: env.session_token.as_deref(),
        message_id: env.message_id.as_deref(),
        content: env.content.as_deref(),
        metadata: env.metadata.as_ref(),
        timestamp: Utc::now(),
    })
}

/// Parses an inbound text frame.
///
/// # Errors
///
/// [`DecodeError::Malformed`] for non-JSON or shape mismatches,
/// [`DecodeError::UnknownKind`] for kinds outside the closed set.
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    let raw: RawEnvelope =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let kind = EnvelopeKind::from_wire(&raw.kind).ok_or(DecodeError::UnknownKind(raw.kind))?;
    Ok(Envelope {
        kind,
        session_token: raw.session_token,
        message_id: raw.message_id,
        content: raw.content,
        metadata: raw.metadata,
        timestamp: raw.timestamp.as_ref().and_then(parse_timestamp),
    })
}

/// RFC 3339 string or epoch milliseconds; anything else is `None`.
fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}
