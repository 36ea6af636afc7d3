//! Resolution of standard folder keys to provider folder IDs.

use std::collections::BTreeMap;

use tracing::warn;

use super::mail::{Folder, FolderKey};
use crate::account::ProviderKind;

/// How a key was matched to a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The provider identified the folder.
    WellKnown,
    /// Matched on the display name.
    Heuristic,
}

/// Maps each [`FolderKey`] to the folder that holds it for one account.
#[derive(Debug, Clone, Default)]
pub struct FolderMap {
    entries: BTreeMap<FolderKey, (String, Resolution)>,
}

impl FolderMap {
    /// Builds the map from a provider's folder list.
    ///
    /// Provider well-known identifiers win. A key with no well-known folder
    /// falls back to the first folder whose display name suggests it; every
    /// such fallback is logged.
    #[must_use]
    pub fn build(provider: ProviderKind, folders: &[Folder]) -> Self {
        let mut entries = BTreeMap::new();

        for folder in folders {
            if let Some(key) = folder.well_known {
                entries
                    .entry(key)
                    .or_insert_with(|| (folder.id.clone(), Resolution::WellKnown));
            }
        }

        for folder in folders.iter().filter(|f| f.well_known.is_none()) {
            let Some(key) = FolderKey::from_display_name(&folder.name) else {
                continue;
            };
            if entries.contains_key(&key) {
                continue;
            }
            warn!(
                %provider,
                name = %folder.name,
                key = %key,
                "no well-known folder, matched by display name"
            );
            entries.insert(key, (folder.id.clone(), Resolution::Heuristic));
        }

        Self { entries }
    }

    /// Provider folder ID for `key`.
    #[must_use]
    pub fn folder_id(&self, key: FolderKey) -> Option<&str> {
        self.entries.get(&key).map(|(id, _)| id.as_str())
    }

    /// How `key` was resolved.
    #[must_use]
    pub fn resolution(&self, key: FolderKey) -> Option<Resolution> {
        self.entries.get(&key).map(|(_, how)| *how)
    }

    /// Whether nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_beats_display_name() {
        let folders = vec![
            Folder::new("user-1", "Old Inbox"),
            Folder::new("INBOX", "INBOX").well_known(FolderKey::Inbox),
        ];
        let map = FolderMap::build(ProviderKind::Gmail, &folders);
        assert_eq!(map.folder_id(FolderKey::Inbox), Some("INBOX"));
        assert_eq!(
            map.resolution(FolderKey::Inbox),
            Some(Resolution::WellKnown)
        );
    }

    #[test]
    fn falls_back_to_heuristic_when_needed() {
        let folders = vec![
            Folder::new("AAMk-inbox", "Inbox").well_known(FolderKey::Inbox),
            Folder::new("AAMk-arch", "Archive 2019"),
        ];
        let map = FolderMap::build(ProviderKind::Microsoft, &folders);
        assert_eq!(map.folder_id(FolderKey::Archive), Some("AAMk-arch"));
        assert_eq!(
            map.resolution(FolderKey::Archive),
            Some(Resolution::Heuristic)
        );
        assert_eq!(map.folder_id(FolderKey::Trash), None);
    }

    #[test]
    fn first_heuristic_match_wins() {
        let folders = vec![
            Folder::new("a", "Sent Items"),
            Folder::new("b", "Sent (old)"),
        ];
        let map = FolderMap::build(ProviderKind::Microsoft, &folders);
        assert_eq!(map.folder_id(FolderKey::Sent), Some("a"));
    }

    #[test]
    fn empty_list_yields_empty_map() {
        assert!(FolderMap::build(ProviderKind::Gmail, &[]).is_empty());
    }
}
