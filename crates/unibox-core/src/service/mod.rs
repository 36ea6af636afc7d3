//! Mail provider adapters.
//!
//! Gmail and Microsoft Graph are reached over REST with bearer tokens. Both
//! adapters implement [`MailProvider`] and produce the same [`Message`] and
//! [`Folder`] types, so nothing above this module knows which API an account
//! uses.

pub mod folders;
pub mod gmail;
pub mod graph;
pub mod http;
pub mod mail;
pub mod outgoing;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use unibox_oauth::{OAuthClient, Provider, Token};
use url::Url;

use crate::account::{MailAccountConnection, ProviderKind, TokenVault};
use crate::config::Settings;
use crate::{Error, Result};

pub use folders::{FolderMap, Resolution};
pub use gmail::GmailProvider;
pub use graph::GraphProvider;
pub use http::ApiSession;
pub use mail::{Folder, FolderKey, Message, ProviderError, UnknownFolder};
pub use outgoing::OutgoingMessage;

/// One account's mailbox, whichever API serves it.
#[async_trait]
pub trait MailProvider: Send + Sync + fmt::Debug {
    /// Which API this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Lists the account's folders.
    async fn list_folders(&self) -> std::result::Result<Vec<Folder>, ProviderError>;

    /// Lists the newest `page_size` messages of a folder, newest first.
    async fn list_messages(
        &self,
        folder_id: &str,
        page_size: usize,
    ) -> std::result::Result<Vec<Message>, ProviderError>;

    /// Sends a message from the account.
    async fn send_message(&self, message: &OutgoingMessage)
    -> std::result::Result<(), ProviderError>;

    /// Address of the mailbox the token belongs to.
    async fn account_address(&self) -> std::result::Result<String, ProviderError>;

    /// Token currently in use, including any refresh done by this adapter.
    async fn current_token(&self) -> Token;
}

/// Builds the adapter for a connection.
pub trait ProviderFactory: Send + Sync {
    /// Creates an adapter for `conn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is not configured.
    fn create(&self, conn: &MailAccountConnection) -> Result<Arc<dyn MailProvider>>;
}

/// Creates REST adapters that share one HTTP connection pool.
pub struct HttpProviderFactory {
    http: Client,
    google: Option<OAuthClient>,
    microsoft: Option<OAuthClient>,
    gmail_base: Url,
    graph_base: Url,
    vault: Option<Arc<dyn TokenVault>>,
}

impl fmt::Debug for HttpProviderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProviderFactory")
            .field("gmail_base", &self.gmail_base.as_str())
            .field("graph_base", &self.graph_base.as_str())
            .field("google", &self.google.is_some())
            .field("microsoft", &self.microsoft.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpProviderFactory {
    /// Builds the factory from settings.
    ///
    /// A provider without a client ID stays unconfigured; creating an adapter
    /// for it fails with a configuration error.
    ///
    /// # Errors
    ///
    /// Returns an error if an API base URL is invalid.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = Client::new();
        let redirect = settings.oauth.redirect_uri();

        let google = match &settings.oauth.google_client_id {
            Some(id) => {
                let mut client = OAuthClient::new(id, Provider::google()?)
                    .with_redirect_uri(&redirect)
                    .with_http_client(http.clone());
                if let Some(secret) = &settings.oauth.google_client_secret {
                    client = client.with_client_secret(secret);
                }
                Some(client)
            }
            None => None,
        };
        let microsoft = match &settings.oauth.microsoft_client_id {
            Some(id) => Some(
                OAuthClient::new(id, Provider::microsoft()?)
                    .with_redirect_uri(&redirect)
                    .with_http_client(http.clone()),
            ),
            None => None,
        };

        let parse = |name: &str, value: &str| {
            Url::parse(value).map_err(|e| Error::Config(format!("{name}: {e}")))
        };

        Ok(Self {
            gmail_base: parse("api.gmail_base", &settings.api.gmail_base)?,
            graph_base: parse("api.graph_base", &settings.api.graph_base)?,
            http,
            google,
            microsoft,
            vault: None,
        })
    }

    /// Persist tokens refreshed by created adapters.
    #[must_use]
    pub fn with_vault(mut self, vault: Arc<dyn TokenVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    /// Replaces the OAuth client used for `kind`.
    #[must_use]
    pub fn with_oauth_client(mut self, kind: ProviderKind, client: OAuthClient) -> Self {
        let client = client.with_http_client(self.http.clone());
        match kind {
            ProviderKind::Gmail => self.google = Some(client),
            ProviderKind::Microsoft => self.microsoft = Some(client),
        }
        self
    }

    /// OAuth client for `kind`, if configured.
    #[must_use]
    pub const fn oauth_client(&self, kind: ProviderKind) -> Option<&OAuthClient> {
        match kind {
            ProviderKind::Gmail => self.google.as_ref(),
            ProviderKind::Microsoft => self.microsoft.as_ref(),
        }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, conn: &MailAccountConnection) -> Result<Arc<dyn MailProvider>> {
        let oauth = self.oauth_client(conn.provider).cloned().ok_or_else(|| {
            Error::Config(format!(
                "no OAuth client ID configured for {}",
                conn.provider.display_name()
            ))
        })?;

        let mut session = ApiSession::new(self.http.clone(), oauth, conn.token.clone());
        if let (Some(id), Some(vault)) = (conn.id, &self.vault) {
            session = session.with_vault(id, Arc::clone(vault));
        }

        Ok(match conn.provider {
            ProviderKind::Gmail => Arc::new(GmailProvider::new(session, self.gmail_base.clone())),
            ProviderKind::Microsoft => {
                Arc::new(GraphProvider::new(session, self.graph_base.clone()))
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn conn(kind: ProviderKind) -> MailAccountConnection {
        MailAccountConnection::new(kind, "a@example.com", Token::bearer("t"))
    }

    #[test]
    fn unconfigured_provider_is_a_config_error() {
        let factory = HttpProviderFactory::from_settings(&Settings::default()).unwrap();
        let err = factory.create(&conn(ProviderKind::Gmail)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn configured_provider_builds_matching_adapter() {
        let mut settings = Settings::default();
        settings.oauth.google_client_id = Some("gid".into());
        settings.oauth.microsoft_client_id = Some("mid".into());
        let factory = HttpProviderFactory::from_settings(&settings).unwrap();

        let gmail = factory.create(&conn(ProviderKind::Gmail)).unwrap();
        assert_eq!(gmail.kind(), ProviderKind::Gmail);
        let graph = factory.create(&conn(ProviderKind::Microsoft)).unwrap();
        assert_eq!(graph.kind(), ProviderKind::Microsoft);
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut settings = Settings::default();
        settings.api.graph_base = "::".into();
        assert!(matches!(
            HttpProviderFactory::from_settings(&settings),
            Err(Error::Config(_))
        ));
    }
}
