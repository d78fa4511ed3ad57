use mnp_chat::types::api::{EscalationRequest, SendMessageRequest};
use mnp_chat::types::{ChatMode, EscalationPriority, EscalationStatus};
use mnp_chat::{ApiClient, ChatBackend, ChatConfig, ChatError, TokenProvider};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ApiClient {
    let config = ChatConfig::default()
        .with_api_url(server.uri())
        .with_api_key("test-api-key");
    ApiClient::new(&config).unwrap().with_backoff(
        backon::ExponentialBuilder::default()
            .with_min_delay(std::time::Duration::from_millis(10))
            .with_max_delay(std::time::Duration::from_millis(50))
            .with_max_times(3),
    )
}

fn send_request() -> SendMessageRequest {
    SendMessageRequest {
        session_token: "sess-1".into(),
        message: "How long does porting take?".into(),
        mode: ChatMode::StepByStep,
        context_data: None,
    }
}

#[tokio::test]
async fn send_message_posts_camel_case_body_with_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("authorization", "Bearer test-api-key"))
        .and(body_json(json!({
            "sessionToken": "sess-1",
            "message": "How long does porting take?",
            "mode": "step_by_step"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Usually within a day.",
            "metadata": {"confidenceScore": 0.8, "responseTime": 95},
            "actions": [{"type": "button", "label": "Fees", "value": "fees"}],
            "sessionInfo": {"sessionToken": "sess-1", "mode": "step_by_step", "currentStep": "timeline"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server).send_message(send_request()).await.unwrap();
    assert_eq!(resp.message, "Usually within a day.");
    assert_eq!(resp.actions.len(), 1);
    assert_eq!(resp.session_info.unwrap().current_step, "timeline");
}

#[tokio::test]
async fn retry_429_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "statusCode": 429,
            "message": "Rate limit exceeded"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server).send_message(send_request()).await.unwrap();
    assert_eq!(resp.message, "ok");
}

#[tokio::test]
async fn retry_500_exhausts_then_reports_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(4)
        .mount(&server)
        .await;

    let err = client(&server)
        .send_message(send_request())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.is_request_failure());
}

#[tokio::test]
async fn no_retry_on_400() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "statusCode": 400,
            "message": "mode is invalid",
            "error": "bad_request"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .send_message(send_request())
        .await
        .unwrap_err();
    match err {
        ChatError::Api(obj) => {
            assert_eq!(obj.status_code, Some(400));
            assert_eq!(obj.message, "mode is invalid");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_body_is_a_serde_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .send_message(send_request())
        .await
        .unwrap_err();
    assert!(matches!(&err, ChatError::Serde(msg) if msg.contains("maintenance")));
    assert!(err.is_request_failure());
}

#[tokio::test]
async fn history_encodes_token_and_paginates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/history/a%2Fb"))
        .and(query_param("page", "2"))
        .and(query_param("limit", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "m1", "type": "ai", "content": "Welcome back"}],
            "mode": "roadmap"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server).history("a/b", 2, 25).await.unwrap();
    assert_eq!(resp.messages.len(), 1);
    assert_eq!(resp.mode, Some(ChatMode::Roadmap));
}

#[tokio::test]
async fn escalation_endpoints_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/escalation"))
        .and(body_json(json!({
            "sessionToken": "sess-1",
            "reason": "billing dispute",
            "context": [],
            "priority": "high"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ticketId": "T-100",
            "estimatedWaitTime": 12
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/escalation/status/sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "waiting_customer",
            "ticketId": "T-100",
            "assignedAgent": "Tanaka"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let ticket = api
        .create_escalation(EscalationRequest {
            session_token: "sess-1".into(),
            reason: "billing dispute".into(),
            context: vec![],
            priority: Some(EscalationPriority::High),
            contact_info: None,
        })
        .await
        .unwrap();
    assert_eq!(ticket.ticket_id, "T-100");
    assert_eq!(ticket.estimated_wait_time, Some(12));

    let status = api.escalation_status("sess-1").await.unwrap();
    assert_eq!(status.status, EscalationStatus::WaitingCustomer);
    assert_eq!(status.assigned_agent.as_deref(), Some("Tanaka"));
}

#[tokio::test]
async fn ws_token_is_fetched_per_session() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sessions/sess-1/ws-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"wsToken": "short-lived"})))
        .expect(1)
        .mount(&server)
        .await;

    let token = client(&server).ws_token("sess-1").await.unwrap();
    assert_eq!(token, "short-lived");
}

#[tokio::test]
async fn ws_token_failures_map_to_auth_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sessions/sess-1/ws-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "statusCode": 401,
            "message": "session expired"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/sessions/sess-2/ws-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"wsToken": ""})))
        .mount(&server)
        .await;

    let api = client(&server);
    let err = api.ws_token("sess-1").await.unwrap_err();
    assert!(matches!(&err, ChatError::AuthToken(msg) if msg.contains("session expired")));

    let err = api.ws_token("sess-2").await.unwrap_err();
    assert!(matches!(err, ChatError::AuthToken(_)));

    let err = api.ws_token("  ").await.unwrap_err();
    assert!(matches!(err, ChatError::AuthToken(_)));
}
