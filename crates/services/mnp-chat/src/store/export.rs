//! Chat history export.
//!
//! Only allow-listed fields leave the client: the session token and any
//! metadata beyond `confidence` and `responseTime` are dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ChatState;
use crate::types::{ChatMode, Message, MessageType, Session, SessionStatus};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatExport<'a> {
    exported_at: DateTime<Utc>,
    session: Option<SessionExport<'a>>,
    messages: Vec<MessageExport<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionExport<'a> {
    id: &'a str,
    mode: ChatMode,
    current_step: &'a str,
    status: &'a SessionStatus,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageExport<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: MessageType,
    content: &'a str,
    timestamp: DateTime<Utc>,
    metadata: MetadataExport,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataExport {
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_time: Option<u64>,
}

impl<'a> From<&'a Session> for SessionExport<'a> {
    fn from(s: &'a Session) -> Self {
        Self {
            id: &s.id,
            mode: s.mode,
            current_step: &s.current_step,
            status: &s.status,
            created_at: s.created_at,
        }
    }
}

impl<'a> From<&'a Message> for MessageExport<'a> {
    fn from(m: &'a Message) -> Self {
        let metadata = m
            .metadata
            .as_ref()
            .map(|meta| MetadataExport {
                confidence: meta.confidence,
                response_time: meta.response_time,
            })
            .unwrap_or_default();
        Self {
            id: &m.id,
            kind: m.kind,
            content: &m.content,
            timestamp: m.timestamp,
            metadata,
        }
    }
}

impl<'a> ChatExport<'a> {
    pub(crate) fn of(state: &'a ChatState) -> Self {
        Self {
            exported_at: Utc::now(),
            session: state.session.as_ref().map(SessionExport::from),
            messages: state.messages.iter().map(MessageExport::from).collect(),
        }
    }
}
