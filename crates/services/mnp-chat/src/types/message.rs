//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Written by the customer.
    User,
    /// Produced by the assistant (backend or local fallback).
    Ai,
    /// Client or backend notice.
    System,
}

/// Delivery state of an optimistic user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Request in flight.
    Sending,
    /// Backend answered.
    Sent,
    /// Backend unreachable or the send failed; eligible for retry.
    Failed,
}

/// Kind of an action attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Quick-reply button; `value` is fed back into `send_message`.
    Button,
    /// Starts the human handoff; `value` is the escalation reason.
    Escalation,
    /// Opens an external resource.
    Link,
    /// Anything the client does not interpret.
    #[serde(other)]
    Other,
}

/// Action attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Action kind.
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Display label.
    pub label: String,
    /// Opaque value fed back into send/escalate paths.
    pub value: String,
}

impl Action {
    /// Quick-reply button.
    pub fn button(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Button,
            label: label.into(),
            value: value.into(),
        }
    }

    /// Escalation trigger.
    pub fn escalation(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Escalation,
            label: label.into(),
            value: reason.into(),
        }
    }
}

/// Optional metadata on a message.
///
/// Keys the client does not model are kept in `extra` so they survive
/// storage; [`crate::store::ChatStore::export_chat_history`] strips them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Backend confidence score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Actions offered with the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Action>>,
    /// Backend response time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    /// Set on locally generated fallback replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_demo: Option<bool>,
    /// Unmodelled keys.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessageMetadata {
    /// Whether the message was synthesized locally.
    #[must_use]
    pub fn is_demo(&self) -> bool {
        self.is_demo.unwrap_or(false)
    }
}

/// A conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier.
    pub id: String,
    /// Author role.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Text content.
    pub content: String,
    /// Sender role; always equal to `kind`.
    pub sender: MessageType,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    /// Delivery state; user messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<DeliveryStatus>,
}

impl Message {
    /// New message with a random id and the current timestamp.
    pub fn new(kind: MessageType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            sender: kind,
            timestamp: Utc::now(),
            metadata: None,
            delivery_status: None,
        }
    }

    /// Optimistic user message, delivery `sending`.
    pub fn user(content: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::User, content);
        msg.delivery_status = Some(DeliveryStatus::Sending);
        msg
    }

    /// Assistant message.
    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageType::Ai, content)
    }

    /// System notice.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageType::System, content)
    }

    /// Replaces the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Actions carried in metadata, if any.
    pub fn actions(&self) -> &[Action] {
        self.metadata
            .as_ref()
            .and_then(|m| m.sources.as_deref())
            .unwrap_or(&[])
    }

    /// Whether this is a locally generated fallback reply.
    pub fn is_demo(&self) -> bool {
        self.metadata.as_ref().is_some_and(MessageMetadata::is_demo)
    }
}

/// Targeted patch for [`crate::store::ChatStore::update_message`].
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    /// Replacement content (streaming / correction).
    pub content: Option<String>,
    /// Replacement metadata.
    pub metadata: Option<MessageMetadata>,
    /// New delivery state.
    pub delivery_status: Option<DeliveryStatus>,
}

impl MessagePatch {
    /// Patch that replaces the content.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Patch that only moves the delivery state.
    pub const fn delivery(status: DeliveryStatus) -> Self {
        Self {
            content: None,
            metadata: None,
            delivery_status: Some(status),
        }
    }

    pub(crate) fn apply(self, msg: &mut Message) {
        if let Some(content) = self.content {
            msg.content = content;
        }
        if let Some(metadata) = self.metadata {
            msg.metadata = Some(metadata);
        }
        if let Some(status) = self.delivery_status {
            msg.delivery_status = Some(status);
        }
    }
}
