//! The unified inbox.
//!
//! [`Inbox`] owns the account selector, the active adapter, the folder cache
//! and the folder map. Fetching is split in two steps so callers can await
//! the network without holding the inbox: [`Inbox::fetch_request`] hands out
//! a [`FetchTicket`] stamped with the session epoch, and [`Inbox::apply`]
//! stores its [`FetchOutcome`] only if that epoch is still current.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::account::{
    AccountSelector, MailAccountConnection, SelectOutcome, SelectionSource,
};
use crate::cache::FolderCache;
use crate::compose::ComposeDraft;
use crate::config::Settings;
use crate::debounce::Debouncer;
use crate::service::{
    Folder, FolderKey, FolderMap, MailProvider, Message, ProviderError, ProviderFactory,
};
use crate::state::LoadState;
use crate::{Error, Result};

const STATUS_CHECK_PERIOD: Duration = Duration::from_secs(60);

/// Why a folder could not be shown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FolderError {
    /// The provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The account has no folder for this key.
    #[error("This account has no {0} folder")]
    NotAvailable(FolderKey),
}

impl FolderError {
    /// Whether the account must be reconnected.
    #[must_use]
    pub const fn requires_reconnect(&self) -> bool {
        match self {
            Self::Provider(e) => e.requires_reconnect(),
            Self::NotAvailable(_) => false,
        }
    }
}

/// Whether the active account can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not checked yet.
    #[default]
    Unknown,
    /// Last call succeeded.
    Connected,
    /// Credentials were rejected; the account must be reconnected.
    ReconnectRequired,
}

/// What [`Inbox::fetch_request`] decided.
#[derive(Debug)]
pub enum FetchPlan {
    /// Served from cache; the list is already loaded.
    Cached,
    /// A network fetch is needed.
    Fetch(FetchTicket),
    /// The folder cannot be fetched; the list holds the error.
    Failed(FolderError),
}

/// A pending folder fetch, detached from the inbox.
#[derive(Debug)]
pub struct FetchTicket {
    epoch: u64,
    key: FolderKey,
    folder_id: Option<String>,
    provider: Arc<dyn MailProvider>,
    page_size: usize,
    background: bool,
}

impl FetchTicket {
    /// Epoch the fetch belongs to.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Folder being fetched.
    #[must_use]
    pub const fn key(&self) -> FolderKey {
        self.key
    }

    /// Performs the fetch.
    ///
    /// When the folder map has not been loaded yet the folder list is fetched
    /// first and returned with the outcome.
    pub async fn run(self) -> FetchOutcome {
        let mut folders = None;
        let folder_id = match self.folder_id {
            Some(id) => Ok(id),
            None => match self.provider.list_folders().await {
                Ok(list) => {
                    let map = FolderMap::build(self.provider.kind(), &list);
                    let id = map
                        .folder_id(self.key)
                        .map(ToString::to_string)
                        .ok_or(FolderError::NotAvailable(self.key));
                    folders = Some(list);
                    id
                }
                Err(e) => Err(e.into()),
            },
        };

        let result = match folder_id {
            Ok(id) => self
                .provider
                .list_messages(&id, self.page_size)
                .await
                .map_err(FolderError::from),
            Err(e) => Err(e),
        };

        FetchOutcome {
            epoch: self.epoch,
            key: self.key,
            folders,
            result,
            background: self.background,
        }
    }
}

/// Result of a [`FetchTicket`].
#[derive(Debug)]
pub struct FetchOutcome {
    epoch: u64,
    key: FolderKey,
    folders: Option<Vec<Folder>>,
    result: std::result::Result<Vec<Message>, FolderError>,
    background: bool,
}

impl FetchOutcome {
    /// Epoch the fetch belongs to.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Folder that was fetched.
    #[must_use]
    pub const fn key(&self) -> FolderKey {
        self.key
    }

    /// The failure, if the fetch failed.
    #[must_use]
    pub fn error(&self) -> Option<&FolderError> {
        self.result.as_ref().err()
    }
}

/// Single-owner container for everything shown for the active account.
pub struct Inbox {
    selector: AccountSelector,
    factory: Arc<dyn ProviderFactory>,
    provider: Option<Arc<dyn MailProvider>>,
    cache: FolderCache,
    folder_map: FolderMap,
    folders: LoadState<Vec<Folder>, FolderError>,
    current: Option<FolderKey>,
    list: LoadState<Vec<Message>, FolderError>,
    page_size: usize,
    status: ConnectionStatus,
    status_check: Debouncer,
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("active", &self.active_connection().map(|c| &c.email_address))
            .field("epoch", &self.selector.epoch())
            .field("current", &self.current)
            .field("cached", &self.cache.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Inbox {
    /// Creates an inbox over connected accounts, none active.
    #[must_use]
    pub fn new(
        connections: Vec<MailAccountConnection>,
        factory: Arc<dyn ProviderFactory>,
        settings: &Settings,
    ) -> Self {
        Self {
            selector: AccountSelector::new(connections),
            factory,
            provider: None,
            cache: FolderCache::new(settings.cache_ttl()),
            folder_map: FolderMap::default(),
            folders: LoadState::Idle,
            current: None,
            list: LoadState::Idle,
            page_size: settings.page_size,
            status: ConnectionStatus::Unknown,
            status_check: Debouncer::new(STATUS_CHECK_PERIOD),
        }
    }

    /// Makes `email` the active account.
    ///
    /// A switch clears the cache, the shown list and the folder map, and
    /// creates the adapter for the new account. Selecting the account that is
    /// already active changes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is unknown or the adapter cannot be
    /// created.
    pub async fn select_account(
        &mut self,
        email: &str,
        source: SelectionSource,
    ) -> Result<SelectOutcome> {
        self.sync_token().await;

        // The adapter is built before anything changes, so a failure leaves
        // the previous account active and untouched.
        let provider = match self.selector.switch_target(email, source)? {
            Some(conn) => Some(self.factory.create(conn)?),
            None => None,
        };

        let outcome = self.selector.select_account(email, source)?;
        if let SelectOutcome::Switched { epoch } = outcome {
            self.reset_account_state();
            self.provider = provider;
            debug!(epoch, "account state reset");
        }
        Ok(outcome)
    }

    /// Adds or replaces a connection.
    pub fn add_connection(&mut self, conn: MailAccountConnection) {
        let refresh_active = self
            .active_connection()
            .is_some_and(|active| active.matches(&conn.email_address));
        self.selector.add_connection(conn);
        if refresh_active
            && let Some(active) = self.selector.active_connection()
        {
            match self.factory.create(active) {
                Ok(provider) => self.provider = Some(provider),
                Err(e) => warn!(error = %e, "could not rebuild adapter for reconnected account"),
            }
            self.status = ConnectionStatus::Unknown;
        }
    }

    /// Removes a connection. Removing the active account leaves none active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for an unknown address.
    pub fn disconnect(&mut self, email: &str) -> Result<MailAccountConnection> {
        let was_active = self
            .active_connection()
            .is_some_and(|active| active.matches(email));
        let removed = self.selector.disconnect(email)?;
        if was_active {
            self.reset_account_state();
            info!(email = %removed.email_address, "active account disconnected");
        }
        Ok(removed)
    }

    fn reset_account_state(&mut self) {
        self.provider = None;
        self.cache.invalidate(None);
        self.folder_map = FolderMap::default();
        self.folders = LoadState::Idle;
        self.current = None;
        self.list = LoadState::Idle;
        self.status = ConnectionStatus::Unknown;
        self.status_check.reset();
    }

    /// Copies the adapter's current token (which may have been refreshed)
    /// back onto the active connection.
    pub async fn sync_token(&mut self) {
        let Some(provider) = &self.provider else {
            return;
        };
        let token = provider.current_token().await;
        if let Some(email) = self.active_connection().map(|c| c.email_address.clone()) {
            self.selector.update_token(&email, token);
        }
    }

    /// Plans showing folder `key`.
    ///
    /// Without `force`, a fresh cache entry is shown directly. Otherwise the
    /// list is marked loading and a ticket is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveAccount`] when no account is selected.
    pub fn fetch_request(&mut self, key: FolderKey, force: bool) -> Result<FetchPlan> {
        self.current = Some(key);

        if !force && let Some(entry) = self.cache.get(key) {
            debug!(folder = %key, age = ?entry.age(), "serving folder from cache");
            self.list = LoadState::Loaded(entry.messages.clone());
            return Ok(FetchPlan::Cached);
        }

        match self.ticket(key, false)? {
            Ok(ticket) => {
                self.list = LoadState::Loading;
                Ok(FetchPlan::Fetch(ticket))
            }
            Err(e) => {
                self.list = LoadState::Failed(e.clone());
                Ok(FetchPlan::Failed(e))
            }
        }
    }

    /// Plans a refresh of `key` that does not change what is shown.
    ///
    /// A failed background refresh leaves the shown list as it was.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveAccount`] when no account is selected.
    pub fn background_request(
        &self,
        key: FolderKey,
    ) -> Result<std::result::Result<FetchTicket, FolderError>> {
        self.ticket(key, true)
    }

    fn ticket(
        &self,
        key: FolderKey,
        background: bool,
    ) -> Result<std::result::Result<FetchTicket, FolderError>> {
        let provider = self.provider.clone().ok_or(Error::NoActiveAccount)?;

        let folder_id = if self.folder_map.is_empty() {
            None
        } else {
            match self.folder_map.folder_id(key) {
                Some(id) => Some(id.to_string()),
                None => return Ok(Err(FolderError::NotAvailable(key))),
            }
        };

        Ok(Ok(FetchTicket {
            epoch: self.selector.epoch(),
            key,
            folder_id,
            provider,
            page_size: self.page_size,
            background,
        }))
    }

    /// Stores a fetch result.
    ///
    /// Returns `false` and drops the result if it belongs to an earlier
    /// account selection.
    pub fn apply(&mut self, outcome: FetchOutcome) -> bool {
        if !self.selector.is_current(outcome.epoch) {
            debug!(
                folder = %outcome.key,
                fetched_epoch = outcome.epoch,
                epoch = self.selector.epoch(),
                "discarding result for previous account"
            );
            return false;
        }

        if let Some(folders) = outcome.folders {
            self.install_folders(folders);
        }

        let shown = self.current == Some(outcome.key);
        match outcome.result {
            Ok(messages) => {
                self.status = ConnectionStatus::Connected;
                let entry = self.cache.set(outcome.key, messages);
                if shown {
                    self.list = LoadState::Loaded(entry.messages.clone());
                }
            }
            Err(e) => {
                warn!(folder = %outcome.key, error = %e, "folder fetch failed");
                if e.requires_reconnect() {
                    self.status = ConnectionStatus::ReconnectRequired;
                }
                if shown && !(outcome.background && self.list.loaded().is_some()) {
                    self.list = LoadState::Failed(e);
                }
            }
        }
        true
    }

    /// Fetches (or serves from cache) folder `key` and returns the list state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveAccount`] when no account is selected. Fetch
    /// failures end up in the returned state.
    pub async fn open_folder(
        &mut self,
        key: FolderKey,
        force: bool,
    ) -> Result<&LoadState<Vec<Message>, FolderError>> {
        if let FetchPlan::Fetch(ticket) = self.fetch_request(key, force)? {
            let outcome = ticket.run().await;
            self.apply(outcome);
        }
        Ok(&self.list)
    }

    /// Fetches the folder list and rebuilds the folder map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveAccount`] when no account is selected. Fetch
    /// failures end up in the returned state.
    pub async fn load_folders(&mut self) -> Result<&LoadState<Vec<Folder>, FolderError>> {
        let provider = self.provider.clone().ok_or(Error::NoActiveAccount)?;
        self.folders = LoadState::Loading;
        match provider.list_folders().await {
            Ok(folders) => {
                self.status = ConnectionStatus::Connected;
                self.install_folders(folders);
            }
            Err(e) => {
                if e.requires_reconnect() {
                    self.status = ConnectionStatus::ReconnectRequired;
                }
                self.folders = LoadState::Failed(e.into());
            }
        }
        Ok(&self.folders)
    }

    fn install_folders(&mut self, folders: Vec<Folder>) {
        if let Some(provider) = &self.provider {
            self.folder_map = FolderMap::build(provider.kind(), &folders);
        }
        self.folders = LoadState::Loaded(folders);
    }

    /// Validates and sends a draft from the active account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compose`] without any network call if the draft is
    /// incomplete, [`Error::NoActiveAccount`] if no account is selected, or
    /// the provider error if sending fails.
    pub async fn send(&mut self, draft: ComposeDraft) -> Result<()> {
        let conn = self.active_connection().ok_or(Error::NoActiveAccount)?;
        let outgoing = draft.into_outgoing(&conn.email_address)?;
        let provider = self.provider.clone().ok_or(Error::NoActiveAccount)?;

        if let Err(e) = provider.send_message(&outgoing).await {
            if e.requires_reconnect() {
                self.status = ConnectionStatus::ReconnectRequired;
            }
            return Err(e.into());
        }
        info!(recipients = outgoing.all_recipients().len(), "message sent");
        self.cache.invalidate(Some(FolderKey::Sent));
        Ok(())
    }

    /// Checks whether the active account still accepts its credentials.
    ///
    /// Checks are throttled; `None` means this call was skipped.
    pub async fn check_connection(&mut self) -> Option<ConnectionStatus> {
        let provider = self.provider.clone()?;
        if !self.status_check.ready() {
            return None;
        }
        match provider.list_folders().await {
            Ok(_) => self.status = ConnectionStatus::Connected,
            Err(e) if e.requires_reconnect() => {
                warn!(error = %e, "account needs to be reconnected");
                self.status = ConnectionStatus::ReconnectRequired;
            }
            Err(e) => debug!(error = %e, "connection check inconclusive"),
        }
        Some(self.status)
    }

    /// Active connection.
    #[must_use]
    pub fn active_connection(&self) -> Option<&MailAccountConnection> {
        self.selector.active_connection()
    }

    /// All connections.
    #[must_use]
    pub fn connections(&self) -> &[MailAccountConnection] {
        self.selector.connections()
    }

    /// Current session epoch.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.selector.epoch()
    }

    /// Folder currently shown.
    #[must_use]
    pub const fn current_folder(&self) -> Option<FolderKey> {
        self.current
    }

    /// State of the shown message list.
    #[must_use]
    pub const fn messages(&self) -> &LoadState<Vec<Message>, FolderError> {
        &self.list
    }

    /// State of the folder list.
    #[must_use]
    pub const fn folders(&self) -> &LoadState<Vec<Folder>, FolderError> {
        &self.folders
    }

    /// Folder key resolution for the active account.
    #[must_use]
    pub const fn folder_map(&self) -> &FolderMap {
        &self.folder_map
    }

    /// Cached listings.
    #[must_use]
    pub const fn cache(&self) -> &FolderCache {
        &self.cache
    }

    /// Last known connection status.
    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }
}
