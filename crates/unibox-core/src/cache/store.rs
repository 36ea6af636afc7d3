//! Folder cache with a fixed time-to-live.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use super::model::CacheEntry;
use crate::service::{FolderKey, Message};

/// Per-folder message listings for the active account.
///
/// An entry is served only while it is younger than the TTL. There is no
/// other eviction; the inbox clears everything on account switch.
#[derive(Debug, Clone)]
pub struct FolderCache {
    ttl: Duration,
    entries: HashMap<FolderKey, CacheEntry>,
}

impl FolderCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Configured time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `key`; stale entries are treated as absent.
    #[must_use]
    pub fn get(&self, key: FolderKey) -> Option<&CacheEntry> {
        self.entries
            .get(&key)
            .filter(|entry| entry.is_fresh(self.ttl))
    }

    /// Stores (or overwrites) the listing for `key`, stamped now.
    pub fn set(&mut self, key: FolderKey, messages: Vec<Message>) -> &CacheEntry {
        debug!(folder = %key, count = messages.len(), "cached folder listing");
        self.entries
            .entry(key)
            .insert_entry(CacheEntry::new(key, messages))
            .into_mut()
    }

    /// Drops one entry, or every entry when `key` is `None`.
    pub fn invalidate(&mut self, key: Option<FolderKey>) {
        match key {
            Some(key) => {
                self.entries.remove(&key);
            }
            None => self.entries.clear(),
        }
    }

    /// Number of stored entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
