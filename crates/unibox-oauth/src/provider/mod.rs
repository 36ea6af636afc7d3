//! `OAuth2` provider configurations for the supported mail APIs.

use crate::error::{Error, Result};
use url::Url;

/// Gmail REST API scopes: read, send and label changes.
const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
];

/// Microsoft Graph mail scopes. `offline_access` is what yields a refresh token.
const GRAPH_SCOPES: &[&str] = &["Mail.Read", "Mail.Send", "User.Read", "offline_access"];

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Scopes requested when the caller does not pass any.
    pub default_scopes: Vec<String>,
    /// Extra query parameters appended to the authorization URL.
    pub extra_auth_params: Vec<(String, String)>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URLs are invalid.
    pub fn new(
        name: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
            extra_auth_params: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes<S: AsRef<str>>(mut self, scopes: &[S]) -> Self {
        self.default_scopes = scopes.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Adds a provider-specific authorization parameter.
    #[must_use]
    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_auth_params.push((key.into(), value.into()));
        self
    }

    /// Google configuration for the Gmail REST API.
    ///
    /// `access_type=offline` plus `prompt=consent` make Google hand out a
    /// refresh token on every consent, not only the first one.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Ok(Self::new(
            "Google",
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
        )?
        .with_default_scopes(GMAIL_SCOPES)
        .with_auth_param("access_type", "offline")
        .with_auth_param("prompt", "consent"))
    }

    /// Microsoft identity platform configuration for Graph mail access.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn microsoft() -> Result<Self> {
        Ok(Self::new(
            "Microsoft",
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        )?
        .with_default_scopes(GRAPH_SCOPES)
        .with_auth_param("prompt", "select_account"))
    }

    /// Validates that the configuration can be used for a flow.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.token_url.scheme(), "https" | "http") {
            return Err(Error::InvalidConfig(format!(
                "token_url must be http(s), got {}",
                self.token_url.scheme()
            )));
        }
        if self.default_scopes.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "{} has no default scopes",
                self.name
            )));
        }
        Ok(())
    }
}
