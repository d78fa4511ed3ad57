//! Data model shared by the REST client, the codec and the store.

/// REST request and response bodies
pub mod api;
/// Human-handoff types
pub mod escalation;
/// Conversation messages
pub mod message;
/// Sessions and modes
pub mod session;
/// UI flags
pub mod ui;

pub use escalation::{
    ContactInfo, EscalationOptions, EscalationPriority, EscalationState, EscalationStatus,
};
pub use message::{
    Action, ActionKind, DeliveryStatus, Message, MessageMetadata, MessagePatch, MessageType,
};
pub use session::{ChatMode, Session, SessionStatus};
pub use ui::{ConnectionStatus, UiState};
