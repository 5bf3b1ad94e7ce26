use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::config_dir;

/// The set of ids the user has marked as caught.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Collection {
    pub caught: BTreeSet<u32>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

fn get_collection_path() -> PathBuf {
    let config_dir = config_dir();
    fs::create_dir_all(&config_dir).ok();
    config_dir.join("collection.json")
}

impl Collection {
    pub fn load() -> Self {
        Self::load_from(get_collection_path())
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut collection = read_collection(&path).unwrap_or_default();
        collection.path = Some(path);
        collection
    }

    pub fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = fs::write(path, content) {
                    warn!("could not save collection to {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("could not serialize collection: {}", e),
        }
    }

    pub fn is_caught(&self, id: u32) -> bool {
        self.caught.contains(&id)
    }

    /// Flips the caught flag, persists, and returns the new state.
    pub fn toggle(&mut self, id: u32) -> bool {
        let caught = if self.caught.remove(&id) {
            false
        } else {
            self.caught.insert(id);
            true
        };
        self.save();
        caught
    }

    pub fn replace(&mut self, ids: BTreeSet<u32>) {
        self.caught = ids;
        self.save();
    }

    /// Caught ids that fall inside a binder of `total_slots` slots.
    pub fn count_within(&self, total_slots: u32) -> usize {
        if total_slots == 0 {
            return 0;
        }
        self.caught.range(1..=total_slots).count()
    }
}

fn read_collection(path: &Path) -> Option<Collection> {
    if !path.exists() {
        return None;
    }
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(collection) => Some(collection),
        Err(e) => {
            warn!("ignoring unreadable collection {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_toggle_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collection.json");

        let mut collection = Collection::load_from(&path);
        assert!(collection.toggle(25));
        assert!(collection.toggle(4));
        assert!(!collection.toggle(4));

        let reloaded = Collection::load_from(&path);
        assert!(reloaded.is_caught(25));
        assert!(!reloaded.is_caught(4));
    }

    #[test]
    fn test_unreadable_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collection.json");
        fs::write(&path, "not json").unwrap();

        let collection = Collection::load_from(&path);
        assert!(collection.caught.is_empty());
    }

    #[test]
    fn test_count_within_bound() {
        let dir = tempdir().unwrap();
        let mut collection = Collection::load_from(dir.path().join("c.json"));
        collection.replace(BTreeSet::from([1, 50, 151, 300]));

        assert_eq!(collection.count_within(151), 3);
        assert_eq!(collection.count_within(0), 0);
    }
}
