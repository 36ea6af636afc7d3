//! Cache data models.

use std::time::Duration;

use tokio::time::Instant;

use crate::service::{FolderKey, Message};

/// Messages fetched for one folder and when they were fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Folder the listing belongs to.
    pub folder_key: FolderKey,
    /// Listing, newest first.
    pub messages: Vec<Message>,
    /// Fetch time on the runtime clock.
    pub fetched_at: Instant,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(folder_key: FolderKey, messages: Vec<Message>) -> Self {
        Self {
            folder_key,
            messages,
            fetched_at: Instant::now(),
        }
    }

    /// Time since the entry was fetched.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Whether the entry is younger than `ttl`.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}
