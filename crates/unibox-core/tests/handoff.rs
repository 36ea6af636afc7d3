//! Hand-off client and chat session over HTTP.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockServer, Reply};
use serde_json::json;
use unibox_core::{
    ChatRole, ChatSession, ChatState, HandoffClient, HandoffError, HandoffRequest,
    HandoffTransport,
};
use url::Url;

fn client(server: &MockServer, timeout: Duration) -> HandoffClient {
    HandoffClient::new(Url::parse(&server.url("agent/chat")).unwrap(), timeout)
}

#[tokio::test]
async fn reply_is_decoded_and_request_is_json() {
    let server = MockServer::start().await;
    server.route(
        "POST",
        "/agent/chat",
        Reply::json(200, json!({"response": "Summary: lunch moved", "usage": {"tokens": 42}})),
    );

    let request = HandoffRequest::new("What changed?", "s-1").with_agent_id("mail-helper");
    let reply = client(&server, Duration::from_secs(5))
        .send(&request)
        .await
        .unwrap();
    assert_eq!(reply.response, "Summary: lunch moved");
    assert_eq!(reply.usage, Some(json!({"tokens": 42})));

    let sent: serde_json::Value = serde_json::from_str(&server.requests()[0].body).unwrap();
    assert_eq!(
        sent,
        json!({"message": "What changed?", "agent_id": "mail-helper", "session_id": "s-1"})
    );
}

#[tokio::test]
async fn too_many_requests_is_rate_limited() {
    let server = MockServer::start().await;
    server.route("POST", "/agent/chat", Reply::text(429, "slow down"));

    let err = client(&server, Duration::from_secs(5))
        .send(&HandoffRequest::new("hi", "s"))
        .await
        .unwrap_err();
    assert_eq!(err, HandoffError::RateLimited("slow down".into()));
}

#[tokio::test]
async fn limit_text_in_error_body_is_rate_limited() {
    let server = MockServer::start().await;
    server.route(
        "POST",
        "/agent/chat",
        Reply::text(500, "Daily message limit reached for this agent"),
    );

    let err = client(&server, Duration::from_secs(5))
        .send(&HandoffRequest::new("hi", "s"))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn other_failures_keep_status() {
    let server = MockServer::start().await;
    server.route("POST", "/agent/chat", Reply::text(500, "boom"));

    let err = client(&server, Duration::from_secs(5))
        .send(&HandoffRequest::new("hi", "s"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        HandoffError::Api {
            status: 500,
            message: "boom".into()
        }
    );
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    server.route(
        "POST",
        "/agent/chat",
        Reply::json(200, json!({"response": "late"})).delayed(Duration::from_millis(500)),
    );

    let timeout = Duration::from_millis(50);
    let err = client(&server, timeout)
        .send(&HandoffRequest::new("hi", "s"))
        .await
        .unwrap_err();
    assert_eq!(err, HandoffError::Timeout(timeout));
}

#[tokio::test]
async fn chat_session_pauses_after_rate_limit_until_reset() {
    let server = MockServer::start().await;
    server
        .route("POST", "/agent/chat", Reply::text(429, "limit"))
        .route("POST", "/agent/chat", Reply::json(200, json!({"response": "Back again"})));

    let transport = Arc::new(client(&server, Duration::from_secs(5)));
    let mut chat = ChatSession::new(transport, "cli").with_user_id("ann@example.com");

    let entry = chat.submit("first").await.unwrap();
    assert_eq!(entry.role, ChatRole::System);
    assert_eq!(chat.state(), ChatState::RateLimited);

    assert!(chat.submit("ignored").await.unwrap_err().is_rate_limited());
    assert_eq!(server.hits("POST", "/agent/chat"), 1);

    chat.reset();
    let entry = chat.submit("second").await.unwrap();
    assert_eq!(entry.role, ChatRole::Assistant);
    assert_eq!(entry.text, "Back again");

    let sent: serde_json::Value = serde_json::from_str(&server.requests()[1].body).unwrap();
    assert_eq!(sent["user_id"], "ann@example.com");
    assert_eq!(sent["session_id"], "cli");
    let roles: Vec<ChatRole> = chat.transcript().iter().map(|e| e.role).collect();
    assert_eq!(
        roles,
        vec![ChatRole::User, ChatRole::System, ChatRole::User, ChatRole::Assistant]
    );
}
