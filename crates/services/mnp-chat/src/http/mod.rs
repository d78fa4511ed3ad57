//! REST transport.
//!
//! [`ApiClient`] implements both seams the core depends on:
//! [`ChatBackend`] for the store and [`TokenProvider`] for the connection
//! manager. Tests substitute either with scripted doubles.

mod client;
mod endpoints;

pub use client::ApiClient;

use crate::error::Result;
use crate::types::api::{
    EscalationRequest, EscalationStatusResponse, EscalationTicket, HistoryResponse,
    SendMessageRequest, SendMessageResponse,
};
use async_trait::async_trait;

/// Backend operations used by [`crate::store::ChatStore`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `POST /messages`
    async fn send_message(&self, req: SendMessageRequest) -> Result<SendMessageResponse>;

    /// `GET /history/{sessionToken}?page&limit`
    async fn history(&self, session_token: &str, page: u32, limit: u32)
    -> Result<HistoryResponse>;

    /// `POST /escalation`
    async fn create_escalation(&self, req: EscalationRequest) -> Result<EscalationTicket>;

    /// `GET /escalation/status/{sessionToken}`
    async fn escalation_status(&self, session_token: &str) -> Result<EscalationStatusResponse>;
}

/// Source of short-lived WebSocket credentials.
///
/// Implementations report every failure as [`crate::ChatError::AuthToken`].
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchanges a session token for a WebSocket token.
    async fn ws_token(&self, session_token: &str) -> Result<String>;
}
