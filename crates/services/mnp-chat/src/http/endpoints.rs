use async_trait::async_trait;

use super::{ApiClient, ChatBackend, TokenProvider};
use crate::error::{ChatError, Result};
use crate::types::api::{
    EscalationRequest, EscalationStatusResponse, EscalationTicket, HistoryResponse,
    SendMessageRequest, SendMessageResponse, WsTokenResponse,
};

fn segment(token: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(token)
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn send_message(&self, req: SendMessageRequest) -> Result<SendMessageResponse> {
        self.post("/messages", &req).await
    }

    async fn history(
        &self,
        session_token: &str,
        page: u32,
        limit: u32,
    ) -> Result<HistoryResponse> {
        let path = format!("/history/{}", segment(session_token));
        self.get(
            &path,
            &[("page", page.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn create_escalation(&self, req: EscalationRequest) -> Result<EscalationTicket> {
        self.post("/escalation", &req).await
    }

    async fn escalation_status(&self, session_token: &str) -> Result<EscalationStatusResponse> {
        let path = format!("/escalation/status/{}", segment(session_token));
        self.get(&path, &[]).await
    }
}

#[async_trait]
impl TokenProvider for ApiClient {
    async fn ws_token(&self, session_token: &str) -> Result<String> {
        if session_token.trim().is_empty() {
            return Err(ChatError::AuthToken("no session token".into()));
        }
        let path = format!("/sessions/{}/ws-token", segment(session_token));
        let resp: WsTokenResponse = self
            .post(&path, &serde_json::json!({}))
            .await
            .map_err(|e| ChatError::AuthToken(e.to_string()))?;
        if resp.ws_token.is_empty() {
            return Err(ChatError::AuthToken("backend returned an empty token".into()));
        }
        Ok(resp.ws_token)
    }
}
