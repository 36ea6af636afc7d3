//! Normalized mail types shared by every provider adapter.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors returned by provider adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Token rejected or cannot be refreshed; the account must be reconnected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error text from the response body, if any.
        message: String,
    },

    /// The API answered with something we could not decode.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether the user has to reconnect the account.
    #[must_use]
    pub const fn requires_reconnect(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Whether trying again later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Auth(_) | Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<unibox_oauth::Error> for ProviderError {
    fn from(e: unibox_oauth::Error) -> Self {
        match e {
            unibox_oauth::Error::Http(e) => Self::Network(e.to_string()),
            other => Self::Auth(other.to_string()),
        }
    }
}

/// Standard folders every account exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderKey {
    /// Incoming mail.
    Inbox,
    /// Sent mail.
    Sent,
    /// Unsent drafts.
    Drafts,
    /// Archived mail.
    Archive,
    /// Spam/junk.
    Spam,
    /// Deleted mail.
    Trash,
}

impl FolderKey {
    /// Every key, in sidebar order.
    pub const ALL: [Self; 6] = [
        Self::Inbox,
        Self::Sent,
        Self::Drafts,
        Self::Archive,
        Self::Spam,
        Self::Trash,
    ];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Archive => "archive",
            Self::Spam => "spam",
            Self::Trash => "trash",
        }
    }

    /// Guess the key from a folder's display name.
    ///
    /// Only used when the provider did not identify the folder itself.
    #[must_use]
    pub fn from_display_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|part| !part.is_empty())
            .collect();
        let has_word = |word: &str| words.contains(&word);
        let has_stem = |stem: &str| words.iter().any(|part| part.starts_with(stem));

        if has_word("inbox") {
            Some(Self::Inbox)
        } else if has_word("sent") {
            Some(Self::Sent)
        } else if has_stem("draft") {
            Some(Self::Drafts)
        } else if has_stem("archiv") {
            Some(Self::Archive)
        } else if has_word("spam") || has_word("junk") {
            Some(Self::Spam)
        } else if has_word("trash") || has_word("deleted") || has_word("bin") {
            Some(Self::Trash)
        } else {
            None
        }
    }
}

impl fmt::Display for FolderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a folder name is not one of the standard keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown folder `{0}` (expected inbox, sent, drafts, archive, spam or trash)")]
pub struct UnknownFolder(pub String);

impl FromStr for FolderKey {
    type Err = UnknownFolder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbox" => Ok(Self::Inbox),
            "sent" => Ok(Self::Sent),
            "drafts" | "draft" => Ok(Self::Drafts),
            "archive" => Ok(Self::Archive),
            "spam" | "junk" => Ok(Self::Spam),
            "trash" | "deleted" => Ok(Self::Trash),
            other => Err(UnknownFolder(other.to_string())),
        }
    }
}

/// A folder (Gmail label or Graph mail folder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Provider-specific folder identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Standard folder this is, when the provider says so.
    pub well_known: Option<FolderKey>,
    /// Number of unread messages (if known).
    pub unread_count: Option<u32>,
    /// Total message count (if known).
    pub total_count: Option<u32>,
}

impl Folder {
    /// Creates a folder with no counts.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            well_known: None,
            unread_count: None,
            total_count: None,
        }
    }

    /// Marks the folder as a provider well-known folder.
    #[must_use]
    pub const fn well_known(mut self, key: FolderKey) -> Self {
        self.well_known = Some(key);
        self
    }
}

/// A message as every adapter reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Provider message ID.
    pub id: String,
    /// Subject line (empty when missing).
    pub subject: String,
    /// Sender, as `Name <address>` or a bare address.
    pub from: String,
    /// When the provider received the message.
    pub received_at: DateTime<Utc>,
    /// Whether the message has been read.
    pub is_read: bool,
    /// Whether the message is starred/flagged.
    pub is_starred: bool,
    /// Short plain-text preview.
    pub body_preview: String,
    /// Full body, when fetched.
    pub body: Option<String>,
    /// RFC 5322 `Message-ID`, used for threading replies.
    pub internet_message_id: Option<String>,
}

impl Message {
    /// Bare address of the sender, without any display name.
    #[must_use]
    pub fn sender_address(&self) -> &str {
        match (self.from.rfind('<'), self.from.rfind('>')) {
            (Some(start), Some(end)) if start < end => self.from[start + 1..end].trim(),
            _ => self.from.trim(),
        }
    }
}
