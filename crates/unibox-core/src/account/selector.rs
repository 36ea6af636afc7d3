//! Active account selection.

use tracing::{debug, info};
use unibox_oauth::Token;

use super::model::MailAccountConnection;
use crate::{Error, Result};

/// Where a selection request came from, weakest first.
///
/// A selection made from a stronger source is never replaced by a weaker one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SelectionSource {
    /// Choice persisted by a previous session.
    Restored,
    /// Address passed in from outside (command line flag, link).
    Hint,
    /// Explicit user choice.
    Manual,
}

/// Result of a selection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The active account changed; per-account state must be reset.
    Switched {
        /// Session epoch after the switch.
        epoch: u64,
    },
    /// The account was already active; nothing to reset.
    Unchanged,
    /// A weaker source tried to replace a stronger selection.
    Ignored,
}

/// Owns the connected accounts and which one is active.
///
/// Every change of the active account bumps the session epoch. Work started
/// under an older epoch belongs to an account that is no longer shown.
#[derive(Debug, Default)]
pub struct AccountSelector {
    connections: Vec<MailAccountConnection>,
    active: Option<usize>,
    source: Option<SelectionSource>,
    epoch: u64,
}

impl AccountSelector {
    /// Create a selector over already connected accounts, none active.
    #[must_use]
    pub fn new(connections: Vec<MailAccountConnection>) -> Self {
        Self {
            connections,
            ..Self::default()
        }
    }

    /// Makes `email` the active account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if no connection has that address.
    pub fn select_account(&mut self, email: &str, source: SelectionSource) -> Result<SelectOutcome> {
        let index = self
            .connections
            .iter()
            .position(|c| c.matches(email))
            .ok_or_else(|| Error::AccountNotFound(email.trim().to_string()))?;

        if self.active == Some(index) {
            self.source = self.source.max(Some(source));
            return Ok(SelectOutcome::Unchanged);
        }

        if let Some(current) = self.source
            && self.active.is_some()
            && source < current
        {
            debug!(?source, ?current, email, "selection ignored, weaker than current");
            return Ok(SelectOutcome::Ignored);
        }

        self.active = Some(index);
        self.source = Some(source);
        self.epoch += 1;
        info!(
            email = %self.connections[index].email_address,
            epoch = self.epoch,
            "active account changed"
        );
        Ok(SelectOutcome::Switched { epoch: self.epoch })
    }

    /// Connection that [`select_account`](Self::select_account) would make
    /// active, or `None` when the request would leave the selection as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if no connection has that address.
    pub fn switch_target(
        &self,
        email: &str,
        source: SelectionSource,
    ) -> Result<Option<&MailAccountConnection>> {
        let index = self
            .connections
            .iter()
            .position(|c| c.matches(email))
            .ok_or_else(|| Error::AccountNotFound(email.trim().to_string()))?;

        let weaker = self
            .source
            .is_some_and(|current| self.active.is_some() && source < current);
        if self.active == Some(index) || weaker {
            return Ok(None);
        }
        Ok(self.connections.get(index))
    }

    /// Adds a newly connected account, or replaces the stored token of an
    /// address that is already connected.
    pub fn add_connection(&mut self, conn: MailAccountConnection) {
        if let Some(existing) = self
            .connections
            .iter_mut()
            .find(|c| c.matches(&conn.email_address))
        {
            *existing = conn;
        } else {
            self.connections.push(conn);
        }
    }

    /// Removes a connection. Disconnecting the active account leaves no
    /// account active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if no connection has that address.
    pub fn disconnect(&mut self, email: &str) -> Result<MailAccountConnection> {
        let index = self
            .connections
            .iter()
            .position(|c| c.matches(email))
            .ok_or_else(|| Error::AccountNotFound(email.trim().to_string()))?;

        match self.active {
            Some(active) if active == index => {
                self.active = None;
                self.source = None;
                self.epoch += 1;
            }
            Some(active) if active > index => self.active = Some(active - 1),
            _ => {}
        }
        Ok(self.connections.remove(index))
    }

    /// Stores a refreshed token on the matching connection.
    pub fn update_token(&mut self, email: &str, token: Token) {
        if let Some(conn) = self.connections.iter_mut().find(|c| c.matches(email)) {
            conn.token = token;
        }
    }

    /// Currently active connection.
    #[must_use]
    pub fn active_connection(&self) -> Option<&MailAccountConnection> {
        self.active.and_then(|i| self.connections.get(i))
    }

    /// All connections.
    #[must_use]
    pub fn connections(&self) -> &[MailAccountConnection] {
        &self.connections
    }

    /// Current session epoch.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether work started at `epoch` still belongs to the active account.
    #[must_use]
    pub const fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }
}
