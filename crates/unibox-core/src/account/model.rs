//! Connection model types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unibox_oauth::Token;

/// Unique identifier for a stored connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub i64);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mail provider behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gmail REST API.
    Gmail,
    /// Microsoft 365 / Outlook through Microsoft Graph.
    Microsoft,
}

impl ProviderKind {
    /// Stable identifier used in storage and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Microsoft => "microsoft",
        }
    }

    /// Get display name for the provider.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Gmail => "Gmail",
            Self::Microsoft => "Outlook",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a provider name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider `{0}` (expected gmail or microsoft)")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" | "google" => Ok(Self::Gmail),
            "microsoft" | "outlook" | "graph" => Ok(Self::Microsoft),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// A connected mail account and the token used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAccountConnection {
    /// Unique identifier (None until saved).
    pub id: Option<ConnectionId>,
    /// Which API this account is served by.
    pub provider: ProviderKind,
    /// Mailbox address; unique per connection.
    pub email_address: String,
    /// Name shown next to the address.
    pub display_name: Option<String>,
    /// Access and refresh token.
    pub token: Token,
}

impl MailAccountConnection {
    /// Create an unsaved connection.
    #[must_use]
    pub fn new(provider: ProviderKind, email_address: impl Into<String>, token: Token) -> Self {
        Self {
            id: None,
            provider,
            email_address: email_address.into(),
            display_name: None,
            token,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Whether this connection is for `email` (addresses compare case-insensitively).
    #[must_use]
    pub fn matches(&self, email: &str) -> bool {
        self.email_address.eq_ignore_ascii_case(email.trim())
    }

    /// Label for lists: display name and address, or the address alone.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) if !name.trim().is_empty() => format!("{name} <{}>", self.email_address),
            _ => self.email_address.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_aliases() {
        assert_eq!("Gmail".parse::<ProviderKind>().unwrap(), ProviderKind::Gmail);
        assert_eq!(
            "outlook".parse::<ProviderKind>().unwrap(),
            ProviderKind::Microsoft
        );
        assert!("yahoo".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn provider_round_trips_through_as_str() {
        for kind in [ProviderKind::Gmail, ProviderKind::Microsoft] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn address_match_ignores_case() {
        let conn = MailAccountConnection::new(
            ProviderKind::Gmail,
            "Alice@Example.com",
            Token::bearer("t"),
        );
        assert!(conn.matches("alice@example.com "));
        assert!(!conn.matches("bob@example.com"));
    }

    #[test]
    fn label_prefers_display_name() {
        let conn = MailAccountConnection::new(ProviderKind::Microsoft, "a@b.io", Token::bearer("t"));
        assert_eq!(conn.label(), "a@b.io");
        assert_eq!(conn.with_display_name("Ann").label(), "Ann <a@b.io>");
    }
}
