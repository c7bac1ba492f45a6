//! # Linked-Folder Registry
//!
//! Persists `(user id, topic id) -> external folder` pairs so the native adapter can re-attach
//! previously linked folders after a restart. The registry lives in its own
//! database, independent of the topic records: linking and unlinking never touch a
//! topic, and wiping topics does not require wiping links (and vice versa).

use crate::error::Result;
use crate::kv::{KeyValueExt, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub const LINKED_FOLDERS_TABLE: &str = "linked_folders";

/// `(user id, topic id)`
pub type LinkKey = (String, String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedFolder {
    pub user_id: String,
    pub topic_id: String,
    pub folder: PathBuf,
    pub linked_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct LinkedFolderRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl LinkedFolderRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn link(&self, user_id: &str, topic_id: &str, folder: PathBuf) -> Result<LinkedFolder> {
        let entry = LinkedFolder {
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            folder,
            linked_at: Utc::now(),
        };
        self.store
            .put_as(LINKED_FOLDERS_TABLE, &record_key(user_id, topic_id), &entry)?;
        Ok(entry)
    }

    pub fn unlink(&self, user_id: &str, topic_id: &str) -> Result<()> {
        self.store
            .delete(LINKED_FOLDERS_TABLE, &record_key(user_id, topic_id))
    }

    pub fn get(&self, user_id: &str, topic_id: &str) -> Result<Option<LinkedFolder>> {
        self.store
            .get_as(LINKED_FOLDERS_TABLE, &record_key(user_id, topic_id))
    }

    /// Every persisted link. Unreadable entries are skipped with a warning.
    pub fn load_all(&self) -> Result<HashMap<LinkKey, PathBuf>> {
        let mut links = HashMap::new();
        for (key, value) in self.store.entries(LINKED_FOLDERS_TABLE)? {
            match serde_json::from_value::<LinkedFolder>(value) {
                Ok(entry) => {
                    links.insert((entry.user_id, entry.topic_id), entry.folder);
                }
                Err(err) => warn!(%key, error = %err, "skipping unreadable folder link"),
            }
        }
        Ok(links)
    }
}

fn record_key(user_id: &str, topic_id: &str) -> String {
    format!("{}/{}", user_id, topic_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemKv;
    use serde_json::json;

    fn registry() -> (Arc<MemKv>, LinkedFolderRegistry) {
        let kv = Arc::new(MemKv::new());
        (kv.clone(), LinkedFolderRegistry::new(kv))
    }

    #[test]
    fn test_link_survives_new_registry_instance() {
        let (kv, reg) = registry();
        reg.link("ann", "climate", PathBuf::from("/notes/climate")).unwrap();

        let reopened = LinkedFolderRegistry::new(kv);
        let links = reopened.load_all().unwrap();
        assert_eq!(
            links.get(&("ann".to_string(), "climate".to_string())),
            Some(&PathBuf::from("/notes/climate"))
        );
    }

    #[test]
    fn test_unlink() {
        let (_kv, reg) = registry();
        reg.link("ann", "a", PathBuf::from("/a")).unwrap();
        reg.link("bo", "a", PathBuf::from("/b")).unwrap();
        reg.unlink("ann", "a").unwrap();
        assert!(reg.get("ann", "a").unwrap().is_none());
        assert_eq!(reg.get("bo", "a").unwrap().unwrap().folder, PathBuf::from("/b"));
        assert_eq!(reg.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_entries_are_skipped() {
        let (kv, reg) = registry();
        kv.put(LINKED_FOLDERS_TABLE, "bad", json!(42)).unwrap();
        reg.link("ann", "good", PathBuf::from("/g")).unwrap();
        let links = reg.load_all().unwrap();
        assert_eq!(links.len(), 1);
        assert!(links.contains_key(&("ann".to_string(), "good".to_string())));
    }
}
