//! Account management module.
//!
//! Provides connected-account storage, token storage and active account
//! selection.

pub mod credentials;
mod model;
mod repository;
mod selector;

pub use credentials::{CredentialError, CredentialResult, KeyringVault, MemoryVault, TokenVault};
pub use model::{ConnectionId, MailAccountConnection, ProviderKind, UnknownProvider};
pub use repository::ConnectionRepository;
pub use selector::{AccountSelector, SelectOutcome, SelectionSource};
