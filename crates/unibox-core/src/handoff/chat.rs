//! Chat transcript over the hand-off endpoint.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{HandoffError, HandoffReply, HandoffRequest, HandoffTransport};

const TIMEOUT_FALLBACK: &str =
    "Sorry, the assistant did not answer in time. Please try again in a moment.";
const RATE_LIMIT_NOTICE: &str = "Usage limit reached. Chat is paused until it is reset.";

/// Who wrote a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The local user.
    User,
    /// The AI endpoint.
    Assistant,
    /// Status and error notes.
    System,
}

impl ChatRole {
    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown chat role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for ChatRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// One line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Author.
    pub role: ChatRole,
    /// Text.
    pub text: String,
    /// When the entry was added.
    pub at: DateTime<Utc>,
}

impl ChatEntry {
    /// Entry stamped now.
    #[must_use]
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Whether the chat accepts input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatState {
    /// Input accepted.
    #[default]
    Ready,
    /// A request is in flight.
    Waiting,
    /// The endpoint's usage limit was hit; input stays refused until
    /// [`ChatSession::reset`].
    RateLimited,
}

/// A conversation with the hand-off endpoint.
///
/// [`begin`](Self::begin) records the user's text and yields the request to
/// send; [`finish`](Self::finish) records the outcome. [`submit`](Self::submit)
/// does both.
#[derive(Debug)]
pub struct ChatSession {
    transport: Arc<dyn HandoffTransport>,
    session_id: String,
    user_id: Option<String>,
    agent_id: Option<String>,
    state: ChatState,
    transcript: Vec<ChatEntry>,
}

impl ChatSession {
    /// Starts an empty session.
    #[must_use]
    pub fn new(transport: Arc<dyn HandoffTransport>, session_id: impl Into<String>) -> Self {
        Self {
            transport,
            session_id: session_id.into(),
            user_id: None,
            agent_id: None,
            state: ChatState::Ready,
            transcript: Vec::new(),
        }
    }

    /// Sends requests on behalf of `user_id`.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Addresses requests to `agent_id`.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ChatState {
        self.state
    }

    /// Entries so far, oldest first.
    #[must_use]
    pub fn transcript(&self) -> &[ChatEntry] {
        &self.transcript
    }

    /// Records `text` and returns the request to send.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::RateLimited`] while the session is rate
    /// limited. Nothing is recorded in that case.
    pub fn begin(&mut self, text: &str) -> Result<HandoffRequest, HandoffError> {
        if self.state == ChatState::RateLimited {
            return Err(HandoffError::RateLimited(
                "chat is paused until reset".to_string(),
            ));
        }

        self.transcript.push(ChatEntry::new(ChatRole::User, text));
        self.state = ChatState::Waiting;

        let mut request = HandoffRequest::new(text, self.session_id.clone());
        request.user_id.clone_from(&self.user_id);
        request.agent_id.clone_from(&self.agent_id);
        Ok(request)
    }

    /// Records the outcome of a request made by [`begin`](Self::begin) and
    /// returns the entry it added.
    pub fn finish(&mut self, result: Result<HandoffReply, HandoffError>) -> &ChatEntry {
        let entry = match result {
            Ok(reply) => {
                self.state = ChatState::Ready;
                ChatEntry::new(ChatRole::Assistant, reply.response)
            }
            Err(HandoffError::RateLimited(detail)) => {
                info!(session = %self.session_id, %detail, "chat rate limited");
                self.state = ChatState::RateLimited;
                ChatEntry::new(ChatRole::System, RATE_LIMIT_NOTICE)
            }
            Err(HandoffError::Timeout(_)) => {
                self.state = ChatState::Ready;
                ChatEntry::new(ChatRole::Assistant, TIMEOUT_FALLBACK)
            }
            Err(e) => {
                self.state = ChatState::Ready;
                ChatEntry::new(ChatRole::System, format!("{e}. You can try again."))
            }
        };
        self.transcript.push(entry);
        &self.transcript[self.transcript.len() - 1]
    }

    /// Sends `text` and records the reply.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::RateLimited`] without sending anything while
    /// the session is rate limited. Failures of the request itself are
    /// recorded in the transcript instead.
    pub async fn submit(&mut self, text: &str) -> Result<&ChatEntry, HandoffError> {
        let request = self.begin(text)?;
        let result = self.transport.send(&request).await;
        Ok(self.finish(result))
    }

    /// Clears the rate-limited state so input is accepted again.
    pub fn reset(&mut self) {
        if self.state == ChatState::RateLimited {
            info!(session = %self.session_id, "chat rate limit reset");
        }
        self.state = ChatState::Ready;
    }
}
