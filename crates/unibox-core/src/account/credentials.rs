//! Secure token storage using the system keyring.
//!
//! Access and refresh tokens never touch the database. They are stored as
//! JSON in the platform's native credential storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! [`MemoryVault`] keeps tokens in process memory and backs the in-memory
//! repository used by tests.

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use tracing::{debug, warn};
use unibox_oauth::Token;

use super::ConnectionId;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "unibox";

/// Credential type identifier for `OAuth2` tokens.
const OAUTH_TOKEN_CREDENTIAL: &str = "oauth_token";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Stored token could not be encoded or decoded.
    #[error("Token encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Connection ID is required for credential operations.
    #[error("Connection ID is required for credential storage")]
    MissingConnectionId,

    /// In-memory vault lock was poisoned.
    #[error("Token vault is unavailable")]
    Unavailable,
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Place where connection tokens are kept.
pub trait TokenVault: Send + Sync + std::fmt::Debug {
    /// Stores (or replaces) the token for a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn store(&self, id: ConnectionId, token: &Token) -> CredentialResult<()>;

    /// Loads the token for a connection, `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the stored value is corrupt.
    fn load(&self, id: ConnectionId) -> CredentialResult<Option<Token>>;

    /// Removes the token for a connection. Missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    fn delete(&self, id: ConnectionId) -> CredentialResult<()>;
}

/// Generates the keyring entry key for a connection's token.
fn credential_key(id: ConnectionId) -> String {
    format!("{SERVICE_NAME}_{OAUTH_TOKEN_CREDENTIAL}_{}", id.0)
}

/// Tokens in the platform keyring.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringVault;

impl TokenVault for KeyringVault {
    fn store(&self, id: ConnectionId, token: &Token) -> CredentialResult<()> {
        store_token(id, token)
    }

    fn load(&self, id: ConnectionId) -> CredentialResult<Option<Token>> {
        get_token(id)
    }

    fn delete(&self, id: ConnectionId) -> CredentialResult<()> {
        delete_token(id)
    }
}

/// Stores an `OAuth2` token in the system keyring.
///
/// # Errors
///
/// Returns an error if the keyring operation or serialization fails.
pub fn store_token(id: ConnectionId, token: &Token) -> CredentialResult<()> {
    let token_json = serde_json::to_string(token)?;
    let entry = Entry::new(SERVICE_NAME, &credential_key(id))?;
    entry.set_password(&token_json)?;
    debug!("Stored OAuth2 token for connection {}", id.0);
    Ok(())
}

/// Retrieves an `OAuth2` token from the system keyring.
///
/// # Errors
///
/// Returns an error if the keyring operation or deserialization fails.
pub fn get_token(id: ConnectionId) -> CredentialResult<Option<Token>> {
    let entry = Entry::new(SERVICE_NAME, &credential_key(id))?;
    match entry.get_password() {
        Ok(token_json) => Ok(Some(serde_json::from_str(&token_json)?)),
        Err(keyring::Error::NoEntry) => {
            debug!("No OAuth2 token found for connection {}", id.0);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Deletes the `OAuth2` token for a connection from the keyring.
///
/// # Errors
///
/// Returns an error if the keyring operation fails (except for missing entries).
pub fn delete_token(id: ConnectionId) -> CredentialResult<()> {
    let entry = Entry::new(SERVICE_NAME, &credential_key(id))?;
    match entry.delete_credential() {
        Ok(()) => {
            debug!("Deleted OAuth2 token for connection {}", id.0);
            Ok(())
        }
        Err(keyring::Error::NoEntry) => {
            debug!("No OAuth2 token to delete for connection {}", id.0);
            Ok(())
        }
        Err(e) => {
            warn!("Failed to delete OAuth2 token: {e}");
            Err(e.into())
        }
    }
}

/// Tokens held in process memory.
#[derive(Debug, Default)]
pub struct MemoryVault {
    tokens: Mutex<HashMap<ConnectionId, Token>>,
}

impl TokenVault for MemoryVault {
    fn store(&self, id: ConnectionId, token: &Token) -> CredentialResult<()> {
        self.tokens
            .lock()
            .map_err(|_| CredentialError::Unavailable)?
            .insert(id, token.clone());
        Ok(())
    }

    fn load(&self, id: ConnectionId) -> CredentialResult<Option<Token>> {
        Ok(self
            .tokens
            .lock()
            .map_err(|_| CredentialError::Unavailable)?
            .get(&id)
            .cloned())
    }

    fn delete(&self, id: ConnectionId) -> CredentialResult<()> {
        self.tokens
            .lock()
            .map_err(|_| CredentialError::Unavailable)?
            .remove(&id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    // Keyring tests talk to the real system keyring and are ignored by
    // default. Run manually with `cargo test -- --ignored`.

    use super::*;

    #[test]
    fn memory_vault_round_trip() {
        let vault = MemoryVault::default();
        let id = ConnectionId::new(1);
        assert!(vault.load(id).unwrap().is_none());

        vault
            .store(id, &Token::bearer("abc").with_refresh_token("r"))
            .unwrap();
        let token = vault.load(id).unwrap().unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.refresh_token.as_deref(), Some("r"));

        vault.delete(id).unwrap();
        vault.delete(id).unwrap();
        assert!(vault.load(id).unwrap().is_none());
    }

    #[test]
    fn keys_are_namespaced_per_connection() {
        assert_eq!(credential_key(ConnectionId::new(7)), "unibox_oauth_token_7");
    }

    #[test]
    #[ignore = "Interacts with system keyring"]
    fn keyring_round_trip() {
        let id = ConnectionId::new(99_999);
        store_token(id, &Token::bearer("keyring-test")).unwrap();
        assert_eq!(get_token(id).unwrap().unwrap().access_token, "keyring-test");
        delete_token(id).unwrap();
        assert!(get_token(id).unwrap().is_none());
    }
}
