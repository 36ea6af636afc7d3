//! HTTP transport for the hand-off endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::{HandoffError, HandoffReply, HandoffRequest, mentions_rate_limit};
use crate::config::Settings;
use crate::{Error, Result};

/// Sends hand-off requests.
#[async_trait]
pub trait HandoffTransport: Send + Sync + std::fmt::Debug {
    /// Posts `request` and waits for the reply.
    async fn send(&self, request: &HandoffRequest) -> std::result::Result<HandoffReply, HandoffError>;
}

/// JSON-over-HTTP hand-off client.
#[derive(Debug, Clone)]
pub struct HandoffClient {
    http: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HandoffClient {
    /// Creates a client for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Url, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            timeout,
        }
    }

    /// Builds the client from settings.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Disabled`] when no endpoint is configured and a
    /// configuration error when it is not a URL.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let endpoint = settings
            .handoff
            .endpoint
            .as_deref()
            .ok_or(HandoffError::Disabled)?;
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("handoff.endpoint: {e}")))?;
        Ok(Self::new(endpoint, settings.handoff_timeout()))
    }

    /// Use a shared HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Configured endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, request: &HandoffRequest) -> std::result::Result<HandoffReply, HandoffError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| HandoffError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HandoffError::Network(e.to_string()))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(HandoffError::RateLimited(shorten(&body)));
        }
        if !status.is_success() {
            if mentions_rate_limit(&body) {
                return Err(HandoffError::RateLimited(shorten(&body)));
            }
            return Err(HandoffError::Api {
                status: status.as_u16(),
                message: shorten(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            if mentions_rate_limit(&body) {
                HandoffError::RateLimited(shorten(&body))
            } else {
                HandoffError::Decode(e.to_string())
            }
        })
    }
}

#[async_trait]
impl HandoffTransport for HandoffClient {
    async fn send(&self, request: &HandoffRequest) -> std::result::Result<HandoffReply, HandoffError> {
        debug!(session = %request.session_id, "handing off to AI endpoint");
        let result = tokio::time::timeout(self.timeout, self.post(request))
            .await
            .unwrap_or(Err(HandoffError::Timeout(self.timeout)));
        if let Err(e) = &result {
            warn!(session = %request.session_id, error = %e, "AI hand-off failed");
        }
        result
    }
}

fn shorten(body: &str) -> String {
    body.chars().take(200).collect()
}
