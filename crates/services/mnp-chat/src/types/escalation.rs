//! Human-handoff (escalation) types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Escalation lifecycle status.
///
/// `none → pending → {assigned, cancelled} → in_progress →
/// waiting_customer ⇄ in_progress → resolved`. `resolved` and `cancelled`
/// are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    /// No escalation.
    #[default]
    None,
    /// Ticket created, waiting for an agent.
    Pending,
    /// Agent assigned.
    Assigned,
    /// Agent working on the ticket.
    InProgress,
    /// Agent waiting on the customer.
    WaitingCustomer,
    /// Ticket closed.
    Resolved,
    /// Ticket withdrawn.
    Cancelled,
}

impl EscalationStatus {
    /// Whether no further transitions are expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    /// Whether `next` is a forward move in the documented lifecycle.
    ///
    /// Staying in the same state is always legal.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use EscalationStatus::{
            Assigned, Cancelled, InProgress, None, Pending, Resolved, WaitingCustomer,
        };
        if self as u8 == next as u8 {
            return true;
        }
        matches!(
            (self, next),
            (None, Pending)
                | (Pending, Assigned | Cancelled)
                | (Assigned, InProgress | Cancelled)
                | (InProgress, WaitingCustomer | Resolved)
                | (WaitingCustomer, InProgress | Resolved)
        )
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::WaitingCustomer => "waiting_customer",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escalation state held by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationState {
    /// Whether a handoff was initiated.
    pub is_escalated: bool,
    /// Reason given, or recommended by the backend.
    pub reason: Option<String>,
    /// When the handoff was initiated.
    pub timestamp: Option<DateTime<Utc>>,
    /// Backend ticket id.
    pub ticket_id: Option<String>,
    /// Estimated wait in minutes.
    pub estimated_wait_time: Option<u32>,
    /// Lifecycle status.
    pub status: EscalationStatus,
    /// Assigned human agent, once known.
    pub assigned_agent: Option<String>,
}

/// Urgency hint sent with an escalation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationPriority {
    /// Default queue.
    Normal,
    /// Expedited queue.
    High,
    /// Immediate attention.
    Urgent,
}

/// How the agent may reach the customer outside the chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    /// Customer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Callback phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Contact e-mail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Optional parts of an escalation request.
#[derive(Debug, Clone, Default)]
pub struct EscalationOptions {
    /// Urgency hint.
    pub priority: Option<EscalationPriority>,
    /// Out-of-band contact details.
    pub contact_info: Option<ContactInfo>,
}
