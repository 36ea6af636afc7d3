//! AI hand-off.
//!
//! Message content or chat text is posted as JSON to an external
//! text-generation endpoint:
//!
//! ```text
//! POST {endpoint}
//! { "message": "...", "agent_id": "...", "session_id": "..." }
//!
//! 200 OK
//! { "response": "...", "usage": { ... } }
//! ```
//!
//! [`ChatSession`] keeps the transcript and the sticky rate-limited state;
//! [`ConversationLog`] stores finished exchanges.

mod chat;
mod client;
mod log;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::service::Message;

pub use chat::{ChatEntry, ChatRole, ChatSession, ChatState, UnknownRole};
pub use client::{HandoffClient, HandoffTransport};
pub use log::ConversationLog;

/// Body of a hand-off request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRequest {
    /// Text to process.
    pub message: String,
    /// End user the request is made for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Agent that should answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Conversation the request belongs to.
    pub session_id: String,
}

impl HandoffRequest {
    /// Request carrying free-form text.
    #[must_use]
    pub fn new(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: None,
            agent_id: None,
            session_id: session_id.into(),
        }
    }

    /// Request describing a received message.
    #[must_use]
    pub fn from_message(message: &Message, session_id: impl Into<String>) -> Self {
        let text = format!(
            "New email from {}\nSubject: {}\nReceived: {}\n\n{}",
            message.from,
            message.subject,
            message.received_at.to_rfc3339(),
            message.body.as_deref().unwrap_or(&message.body_preview)
        );
        Self::new(text, session_id)
    }

    /// One request describing several received messages, newest first.
    #[must_use]
    pub fn from_messages(messages: &[Message], session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        match messages {
            [single] => Self::from_message(single, session_id),
            many => {
                let text = many
                    .iter()
                    .map(|m| Self::from_message(m, "").message)
                    .collect::<Vec<_>>()
                    .join("\n\n---\n\n");
                Self::new(text, session_id)
            }
        }
    }

    /// Set the user identifier.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the agent identifier.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// Endpoint answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffReply {
    /// Generated text.
    pub response: String,
    /// Token accounting, passed through as sent.
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

/// Hand-off failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandoffError {
    /// No endpoint configured.
    #[error("AI hand-off is not configured")]
    Disabled,

    /// The endpoint refused because of its usage limit.
    #[error("Rate limit reached: {0}")]
    RateLimited(String),

    /// No answer within the timeout.
    #[error("No reply within {0:?}")]
    Timeout(Duration),

    /// Request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success reply.
    #[error("Endpoint error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, shortened.
        message: String,
    },

    /// Reply was not the expected JSON.
    #[error("Unexpected reply: {0}")]
    Decode(String),
}

impl HandoffError {
    /// Whether the endpoint's usage limit was hit.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Whether an error text reports a usage limit.
pub(crate) fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("limit reached") || lower.contains("rate limit")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    #[test]
    fn request_omits_missing_ids() {
        let req = HandoffRequest::new("hi", "s1").with_agent_id("agent-7");
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "message": "hi", "agent_id": "agent-7", "session_id": "s1" })
        );
    }

    #[test]
    fn request_from_message_carries_summary() {
        let msg = Message {
            id: "1".into(),
            subject: "Invoice".into(),
            from: "billing@example.com".into(),
            received_at: Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap(),
            is_read: false,
            is_starred: false,
            body_preview: "Your invoice is attached".into(),
            body: None,
            internet_message_id: None,
        };
        let req = HandoffRequest::from_message(&msg, "s1");
        assert!(req.message.starts_with("New email from billing@example.com\n"));
        assert!(req.message.contains("Subject: Invoice\n"));
        assert!(req.message.ends_with("\n\nYour invoice is attached"));
    }

    #[test]
    fn several_messages_make_one_request() {
        let msgs = crate::test_support::messages(&["1", "2"]);
        let req = HandoffRequest::from_messages(&msgs, "s1");
        assert_eq!(req.session_id, "s1");
        assert_eq!(req.message.matches("New email from").count(), 2);
        assert!(req.message.contains("Subject: Subject 2"));
    }

    #[test]
    fn reply_usage_is_optional() {
        let reply: HandoffReply = serde_json::from_str(r#"{"response":"ok"}"#).unwrap();
        assert_eq!(reply.response, "ok");
        assert!(reply.usage.is_none());
    }

    #[test]
    fn rate_limit_wording() {
        assert!(mentions_rate_limit("Daily LIMIT REACHED for this agent"));
        assert!(mentions_rate_limit("rate limit exceeded"));
        assert!(!mentions_rate_limit("internal error"));
    }
}
