//! Error types for the core library.

use thiserror::Error;

use crate::compose::ComposeError;
use crate::handoff::HandoffError;
use crate::knowledge::UploadError;
use crate::service::ProviderError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Mail provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// `OAuth2` operation failed.
    #[error("OAuth error: {0}")]
    OAuth(#[from] unibox_oauth::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No connection with this address.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The operation needs an active account and none is selected.
    #[error("No active account selected")]
    NoActiveAccount,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] crate::account::credentials::CredentialError),

    /// Draft failed validation.
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// AI hand-off failed.
    #[error(transparent)]
    Handoff(#[from] HandoffError),

    /// Knowledge document rejected.
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
