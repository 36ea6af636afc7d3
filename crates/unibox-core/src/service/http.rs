//! Bearer-authenticated HTTP session shared by the REST adapters.

use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use unibox_oauth::{OAuthClient, Token};
use url::Url;

use super::mail::ProviderError;
use crate::account::{ConnectionId, TokenVault};

/// Longest slice of an error body carried into an error message.
const MAX_ERROR_BODY: usize = 200;

/// Holds one account's token and sends authenticated requests with it.
///
/// Expired tokens are refreshed before a request goes out. A `401` triggers
/// one forced refresh and one retry; a second `401` is an auth error.
#[derive(Debug)]
pub struct ApiSession {
    http: Client,
    oauth: OAuthClient,
    token: Mutex<Token>,
    vault: Option<(ConnectionId, Arc<dyn TokenVault>)>,
}

impl ApiSession {
    /// Creates a session.
    #[must_use]
    pub fn new(http: Client, oauth: OAuthClient, token: Token) -> Self {
        Self {
            http,
            oauth,
            token: Mutex::new(token),
            vault: None,
        }
    }

    /// Persist refreshed tokens for `id` into `vault`.
    #[must_use]
    pub fn with_vault(mut self, id: ConnectionId, vault: Arc<dyn TokenVault>) -> Self {
        self.vault = Some((id, vault));
        self
    }

    /// Snapshot of the token currently in use.
    pub async fn token(&self) -> Token {
        self.token.lock().await.clone()
    }

    /// GET `url` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ProviderError> {
        let response = self.execute(|http| http.get(url.clone())).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }

    /// POST `body` as JSON to `url`, ignoring any response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn post_json<B: serde::Serialize + Sync>(
        &self,
        url: &Url,
        body: &B,
    ) -> Result<(), ProviderError> {
        self.execute(|http| http.post(url.clone()).json(body))
            .await
            .map(drop)
    }

    /// Sends the request built by `build`, handling token refresh.
    async fn execute<F>(&self, build: F) -> Result<Response, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.fresh_token().await?;
        let response = build(&self.http)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        debug!(provider = %self.oauth.provider.name, "401 from API, refreshing token once");
        let token = self.force_refresh(&token).await?;
        let response = build(&self.http)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(provider = %self.oauth.provider.name, "token rejected after refresh");
            return Err(ProviderError::Auth(
                "access token rejected after refresh".into(),
            ));
        }
        check_status(response).await
    }

    async fn fresh_token(&self) -> Result<Token, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some(refreshed) = self.oauth.ensure_fresh(&guard).await? {
            self.persist(&refreshed);
            *guard = refreshed;
        }
        Ok(guard.clone())
    }

    async fn force_refresh(&self, used: &Token) -> Result<Token, ProviderError> {
        let mut guard = self.token.lock().await;
        // Another request may already have refreshed it.
        if guard.access_token != used.access_token {
            return Ok(guard.clone());
        }
        let refreshed = self.oauth.refresh_token(&guard).await?;
        self.persist(&refreshed);
        *guard = refreshed;
        Ok(guard.clone())
    }

    fn persist(&self, token: &Token) {
        if let Some((id, vault)) = &self.vault
            && let Err(e) = vault.store(*id, token)
        {
            warn!(connection = %id, "failed to persist refreshed token: {e}");
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
    code: Option<serde_json::Value>,
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Both Gmail and Graph wrap errors as `{"error": {"code": .., "message": ..}}`.
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        match (parsed.error.message, parsed.error.code) {
            (Some(message), _) => return message,
            (None, Some(code)) => return code.to_string(),
            (None, None) => {}
        }
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

/// `base` with `segments` appended as percent-encoded path segments.
///
/// # Errors
///
/// Returns an error if `base` cannot carry a path.
pub fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ProviderError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ProviderError::Decode(format!("base URL cannot have a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
