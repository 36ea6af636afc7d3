//! Authorization Code Flow.

use super::{OAuthClient, PkceChallenge};
use crate::error::{Error, Result};
use crate::token::Token;
use url::Url;

/// Authorization Code Flow used to connect a new mail account.
///
/// The user is sent to [`authorization_url`](Self::authorization_url); the
/// provider redirects back with a `code` that is traded for tokens.
#[derive(Debug)]
pub struct AuthorizationCodeFlow {
    client: OAuthClient,
    pkce: Option<PkceChallenge>,
}

impl AuthorizationCodeFlow {
    /// Creates a new authorization code flow.
    #[must_use]
    pub const fn new(client: OAuthClient) -> Self {
        Self { client, pkce: None }
    }

    /// Enables PKCE (required for public desktop clients).
    #[must_use]
    pub fn with_pkce(mut self) -> Self {
        self.pkce = Some(PkceChallenge::generate());
        self
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &OAuthClient {
        &self.client
    }

    /// Builds the consent URL using the provider's default scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider configuration is unusable.
    pub fn authorization_url(&self, state: Option<&str>) -> Result<Url> {
        self.client.provider.validate()?;
        if self.client.redirect_uri.is_none() {
            return Err(Error::InvalidConfig(
                "authorization code flow needs a redirect_uri".into(),
            ));
        }

        let mut url = self.client.provider.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client.client_id)
                .append_pair("response_type", "code")
                .append_pair("scope", &self.client.provider.default_scopes.join(" "));

            if let Some(redirect_uri) = &self.client.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }
            if let Some(state) = state {
                query.append_pair("state", state);
            }
            if let Some(pkce) = &self.pkce {
                query
                    .append_pair("code_challenge", pkce.challenge())
                    .append_pair("code_challenge_method", pkce.method());
            }
            for (key, value) in &self.client.provider.extra_auth_params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Pulls `code` out of the redirect URL and checks `state` when one was sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider reported an error, the state does not
    /// match, or no code is present.
    pub fn code_from_redirect(redirect: &Url, expected_state: Option<&str>) -> Result<String> {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in redirect.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(Error::oauth_error(error, "authorization was not granted"));
        }
        if let Some(expected) = expected_state
            && state.as_deref() != Some(expected)
        {
            return Err(Error::InvalidResponse("state mismatch".into()));
        }
        code.ok_or_else(|| Error::InvalidResponse("redirect carried no code".into()))
    }

    /// Exchanges the authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        let verifier = self.pkce.as_ref().map(PkceChallenge::verifier);
        self.client.exchange_code(code, verifier).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::Provider;

    fn flow(provider: Provider) -> AuthorizationCodeFlow {
        let client = OAuthClient::new("test_client", provider)
            .with_redirect_uri("http://127.0.0.1:8765/callback");
        AuthorizationCodeFlow::new(client)
    }

    #[test]
    fn google_url_asks_for_offline_access() {
        let url = flow(Provider::google().unwrap())
            .authorization_url(Some("xyz"))
            .unwrap();
        let url = url.as_str();

        assert!(url.contains("client_id=test_client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=xyz"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8765%2Fcallback"));
        assert!(url.contains("gmail.readonly"));
    }

    #[test]
    fn pkce_parameters_are_included() {
        let flow = flow(Provider::microsoft().unwrap()).with_pkce();
        let url = flow.authorization_url(None).unwrap();

        assert!(url.as_str().contains("code_challenge="));
        assert!(url.as_str().contains("code_challenge_method=S256"));
        assert!(url.as_str().contains("offline_access"));
    }

    #[test]
    fn missing_redirect_uri_is_a_config_error() {
        let client = OAuthClient::new("test_client", Provider::google().unwrap());
        let flow = AuthorizationCodeFlow::new(client);
        assert!(matches!(
            flow.authorization_url(None),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn code_is_read_from_redirect() {
        let redirect = Url::parse("http://127.0.0.1:8765/callback?code=4%2F0Ab&state=s1").unwrap();
        let code = AuthorizationCodeFlow::code_from_redirect(&redirect, Some("s1")).unwrap();
        assert_eq!(code, "4/0Ab");
    }

    #[test]
    fn redirect_state_mismatch_is_rejected() {
        let redirect = Url::parse("http://127.0.0.1:8765/callback?code=abc&state=evil").unwrap();
        assert!(AuthorizationCodeFlow::code_from_redirect(&redirect, Some("s1")).is_err());
    }

    #[test]
    fn redirect_error_is_surfaced() {
        let redirect = Url::parse("http://127.0.0.1:8765/callback?error=access_denied").unwrap();
        let err = AuthorizationCodeFlow::code_from_redirect(&redirect, None).unwrap_err();
        assert!(matches!(err, Error::OAuth { ref error, .. } if error == "access_denied"));
    }
}
