//! REST request and response bodies.

use crate::types::escalation::{ContactInfo, EscalationPriority, EscalationStatus};
use crate::types::message::{Action, Message, MessageMetadata, MessageType};
use crate::types::session::{ChatMode, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Session credential.
    pub session_token: String,
    /// User text.
    pub message: String,
    /// Conversation mode.
    pub mode: ChatMode,
    /// Free-form context for the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_data: Option<serde_json::Value>,
}

/// Response metadata of `POST /messages`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Confidence score.
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Backend processing time in milliseconds.
    #[serde(default)]
    pub response_time: Option<u64>,
}

/// Response of `POST /messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    /// Assistant reply.
    pub message: String,
    /// Reply metadata.
    #[serde(default)]
    pub metadata: ResponseMetadata,
    /// Suggested actions.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Updated session, replacing the local one wholesale.
    #[serde(default)]
    pub session_info: Option<Session>,
    /// Backend recommends a human handoff.
    #[serde(default)]
    pub should_escalate: Option<bool>,
    /// Why the handoff is recommended.
    #[serde(default)]
    pub escalation_reason: Option<String>,
}

impl SendMessageResponse {
    /// Builds the assistant message for this reply.
    pub fn to_message(&self) -> Message {
        let metadata = MessageMetadata {
            confidence: self.metadata.confidence_score,
            sources: (!self.actions.is_empty()).then(|| self.actions.clone()),
            response_time: self.metadata.response_time,
            ..MessageMetadata::default()
        };
        Message::ai(self.message.clone()).with_metadata(metadata)
    }

    /// Escalation reason, when the backend recommends one.
    pub fn recommended_escalation(&self) -> Option<&str> {
        if self.should_escalate.unwrap_or(false) {
            Some(
                self.escalation_reason
                    .as_deref()
                    .unwrap_or("Escalation recommended by assistant"),
            )
        } else {
            None
        }
    }
}

/// A message as returned by `GET /history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    /// Message id.
    pub id: String,
    /// Author role.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Text content.
    pub content: String,
    /// Creation instant.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Metadata.
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
}

impl From<HistoryMessage> for Message {
    fn from(h: HistoryMessage) -> Self {
        let mut msg = Self::new(h.kind, h.content).with_id(h.id);
        if let Some(ts) = h.timestamp {
            msg.timestamp = ts;
        }
        msg.metadata = h.metadata;
        if msg.kind == MessageType::User {
            msg.delivery_status = Some(crate::types::message::DeliveryStatus::Sent);
        }
        msg
    }
}

/// Response of `GET /history/{sessionToken}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// Stored messages, oldest first.
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    /// Current session record.
    #[serde(default)]
    pub session_info: Option<Session>,
    /// Current mode.
    #[serde(default)]
    pub mode: Option<ChatMode>,
}

/// One message of escalation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMessage {
    /// Author role.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Text content.
    pub content: String,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for ContextMessage {
    fn from(m: &Message) -> Self {
        Self {
            kind: m.kind,
            content: m.content.clone(),
            timestamp: m.timestamp,
        }
    }
}

/// Body of `POST /escalation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRequest {
    /// Session credential.
    pub session_token: String,
    /// Why the customer wants a human.
    pub reason: String,
    /// Trailing conversation messages.
    pub context: Vec<ContextMessage>,
    /// Urgency hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<EscalationPriority>,
    /// Out-of-band contact details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<ContactInfo>,
}

/// Response of `POST /escalation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationTicket {
    /// Ticket id.
    pub ticket_id: String,
    /// Estimated wait in minutes.
    #[serde(default)]
    pub estimated_wait_time: Option<u32>,
}

/// Response of `GET /escalation/status/{sessionToken}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationStatusResponse {
    /// Current status.
    pub status: EscalationStatus,
    /// Ticket id.
    #[serde(default)]
    pub ticket_id: Option<String>,
    /// Estimated wait in minutes.
    #[serde(default)]
    pub estimated_wait_time: Option<u32>,
    /// Assigned agent.
    #[serde(default)]
    pub assigned_agent: Option<String>,
}

/// Response of `POST /sessions/{sessionToken}/ws-token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsTokenResponse {
    /// Short-lived WebSocket credential.
    pub ws_token: String,
}
