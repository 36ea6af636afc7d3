//! # unibox-oauth
//!
//! `OAuth2` support for the REST mail APIs Unibox talks to.
//!
//! ## Features
//!
//! - **Provider configurations**: Google (Gmail API) and Microsoft (Graph)
//! - **Authorization Code Flow** with PKCE for connecting a new account
//! - **Token management**: expiry checks and `refresh_token` grants
//!
//! ## Connecting an account
//!
//! ```ignore
//! use unibox_oauth::{AuthorizationCodeFlow, OAuthClient, Provider};
//!
//! let client = OAuthClient::new("client-id", Provider::google()?)
//!     .with_redirect_uri("http://127.0.0.1:8765/callback");
//! let flow = AuthorizationCodeFlow::new(client).with_pkce();
//!
//! let url = flow.authorization_url(Some("csrf-state"))?;
//! // open `url`, receive `code` on the redirect ...
//! let token = flow.exchange_code(&code).await?;
//! ```
//!
//! ## Keeping a token fresh
//!
//! ```ignore
//! if let Some(refreshed) = client.ensure_fresh(&token).await? {
//!     // persist `refreshed`
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use error::{Error, Result};
pub use flow::{AuthorizationCodeFlow, OAuthClient, PkceChallenge};
pub use provider::Provider;
pub use token::Token;
