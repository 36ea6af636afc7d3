//! # unibox-core
//!
//! Core logic for Unibox, a unified inbox over several connected mail
//! accounts.
//!
//! This crate provides:
//! - **Provider adapters** for the Gmail REST API and Microsoft Graph behind
//!   one [`MailProvider`] trait and one normalized [`Message`] type
//! - **Folder cache** with a fixed time-to-live
//! - **Account selection** with a single active connection and manual
//!   selection precedence
//! - **Inbox container** that ties the above together and discards results
//!   belonging to a previous account
//! - **Polling** for new inbox mail with an in-flight guard
//! - **Compose/reply/forward** draft building and validation
//! - **AI hand-off** to an external text-generation endpoint
//! - **Local storage** (`SQLite`) for connections, conversation logs and
//!   knowledge documents

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod cache;
pub mod compose;
pub mod config;
pub mod debounce;
mod error;
pub mod handoff;
pub mod inbox;
pub mod knowledge;
pub mod notice;
pub mod poll;
pub mod service;
pub mod state;
#[cfg(test)]
mod test_support;

pub use account::credentials;
pub use account::{
    AccountSelector, ConnectionId, ConnectionRepository, MailAccountConnection, ProviderKind,
    SelectOutcome, SelectionSource,
};
pub use cache::{CacheEntry, FolderCache};
pub use compose::{ComposeDraft, ComposeError, ComposeField, ComposeIssue, ComposeMode};
pub use config::Settings;
pub use debounce::Debouncer;
pub use error::{Error, Result};
pub use handoff::{
    ChatEntry, ChatRole, ChatSession, ChatState, ConversationLog, HandoffClient, HandoffError,
    HandoffReply, HandoffRequest, HandoffTransport,
};
pub use inbox::{ConnectionStatus, FetchOutcome, FetchPlan, FetchTicket, FolderError, Inbox};
pub use knowledge::{KnowledgeDocument, KnowledgeRepository, UploadError, UploadPolicy};
pub use notice::Notice;
pub use poll::{NewMailEvent, PollHandler, PollTracker, Poller, WatchCommand};
pub use service::{
    Folder, FolderKey, FolderMap, HttpProviderFactory, MailProvider, Message, OutgoingMessage,
    ProviderError, ProviderFactory,
};
pub use state::LoadState;
