//! # Virtual-Database Adapter
//!
//! Emulates a file tree on top of a [`KeyValueStore`]. Nothing here touches the real
//! filesystem; the store decides where bytes end up.
//!
//! ## Tables
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `topics` | `users/{user_id}/topics/{id}` | [`TopicMetadata`] plus the owning `user_id` |
//! | `files` | `users/{user_id}/{normalized path}` | [`FileRecord`] |
//! | `directories` | `users/{user_id}/{normalized path}` | `{ "created": ... }` marker |
//!
//! Every key carries the user, so two users may hold topics with the same slug
//! without ever touching each other's records.
//!
//! Directory membership is never stored. `list_directory("a/b")` scans the keys of
//! `files` and `directories` that start with the user's `a/b/` and reports the first
//! remaining segment of each, de-duplicated in first-seen order.
//!
//! Paths are normalized by dropping empty segments, so `/topics//x/` and `topics/x`
//! address the same record.

use super::{sort_topics, StorageAdapter};
use crate::error::{Result, TopicVaultError};
use crate::kv::{KeyValueExt, KeyValueStore};
use crate::model::{is_hidden, topic_root, user_scoped_path, TopicMetadata, TopicUpdate, TOPICS_ROOT};
use crate::scaffold::{Artifact, CreationJournal, TopicScaffold};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const TOPICS_TABLE: &str = "topics";
pub const FILES_TABLE: &str = "files";
pub const DIRECTORIES_TABLE: &str = "directories";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTopic {
    #[serde(flatten)]
    topic: TopicMetadata,
    user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub content: String,
    pub size: usize,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DirectoryMarker {
    created: DateTime<Utc>,
}

pub struct VirtualDbAdapter {
    store: Arc<dyn KeyValueStore>,
    app_name: String,
}

impl VirtualDbAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>, app_name: impl Into<String>) -> Self {
        Self {
            store,
            app_name: app_name.into(),
        }
    }

    fn stored_topic(&self, user_id: &str, topic_id: &str) -> Result<Option<StoredTopic>> {
        self.store
            .get_as(TOPICS_TABLE, &topic_key(user_id, topic_id)?)
    }

    /// Puts `value` and journals what it replaced.
    fn put_journaled<T: Serialize>(
        &self,
        table: &str,
        key: &str,
        value: &T,
        journal: &mut CreationJournal,
    ) -> Result<()> {
        let previous = self.store.get(table, key)?;
        self.store.put_as(table, key, value)?;
        journal.wrote_record(table, key, previous);
        Ok(())
    }

    fn create_topic_staged(
        &self,
        user_id: &str,
        plan: &TopicScaffold,
        journal: &mut CreationJournal,
    ) -> Result<()> {
        let now = Utc::now();
        let stored = StoredTopic {
            topic: plan.topic().clone(),
            user_id: user_id.to_string(),
        };
        self.put_journaled(TOPICS_TABLE, &topic_key(user_id, &plan.topic().id)?, &stored, journal)?;

        let marker = DirectoryMarker { created: now };
        self.put_journaled(
            DIRECTORIES_TABLE,
            &user_scoped_path(user_id, &plan.root())?,
            &marker,
            journal,
        )?;
        for dir in plan.directories() {
            let key = user_scoped_path(user_id, &plan.path_of(dir))?;
            self.put_journaled(DIRECTORIES_TABLE, &key, &marker, journal)?;
        }

        for seed in plan.seed_files() {
            let record = FileRecord {
                content: seed.content.clone(),
                size: seed.content.len(),
                last_modified: now,
            };
            let key = user_scoped_path(user_id, &plan.path_of(&seed.relative_path))?;
            self.put_journaled(FILES_TABLE, &key, &record, journal)?;
        }
        Ok(())
    }

    fn rollback(&self, journal: CreationJournal) {
        for artifact in journal.into_undo_order() {
            let Artifact::Record {
                table,
                key,
                previous,
            } = artifact
            else {
                continue;
            };
            let result = match previous {
                Some(value) => self.store.put(&table, &key, value),
                None => self.store.delete(&table, &key),
            };
            if let Err(err) = result {
                warn!(%table, %key, error = %err, "rollback step failed");
            }
        }
    }

    /// Deletes `prefix` itself and every key below it in `table`.
    fn delete_tree(&self, table: &str, prefix: &str) -> Result<usize> {
        let below = format!("{}/", prefix);
        let mut removed = 0;
        for key in self.store.keys(table)? {
            if key == prefix || key.starts_with(&below) {
                self.store.delete(table, &key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl StorageAdapter for VirtualDbAdapter {
    async fn init(&self) -> Result<()> {
        // Touch the store so a broken database surfaces here, not on first use.
        self.store
            .keys(TOPICS_TABLE)
            .map_err(|err| TopicVaultError::Initialization(err.to_string()))?;
        info!(app = %self.app_name, "virtual database storage ready");
        Ok(())
    }

    async fn create_topic(&self, user_id: &str, topic: &TopicMetadata) -> Result<()> {
        if self.stored_topic(user_id, &topic.id)?.is_some() {
            warn!(user_id, topic_id = %topic.id, "topic already exists, overwriting");
        }

        let plan = TopicScaffold::new(topic, &self.app_name)?;
        let mut journal = CreationJournal::new();
        match self.create_topic_staged(user_id, &plan, &mut journal) {
            Ok(()) => {
                info!(topic_id = %topic.id, "topic created");
                Ok(())
            }
            Err(err) => {
                warn!(topic_id = %topic.id, error = %err, steps = journal.len(), "topic creation failed, rolling back");
                self.rollback(journal);
                Err(err)
            }
        }
    }

    async fn get_topic(&self, user_id: &str, topic_id: &str) -> Result<Option<TopicMetadata>> {
        Ok(self.stored_topic(user_id, topic_id)?.map(|s| s.topic))
    }

    async fn update_topic(
        &self,
        user_id: &str,
        topic_id: &str,
        update: &TopicUpdate,
    ) -> Result<TopicMetadata> {
        let mut stored = self
            .stored_topic(user_id, topic_id)?
            .ok_or_else(|| TopicVaultError::TopicNotFound(topic_id.to_string()))?;
        stored.topic = update.apply(&stored.topic, Utc::now())?;
        self.store
            .put_as(TOPICS_TABLE, &topic_key(user_id, topic_id)?, &stored)?;
        Ok(stored.topic)
    }

    async fn list_topics(&self, user_id: &str) -> Result<Vec<TopicMetadata>> {
        let prefix = format!("{}/", user_scoped_path(user_id, TOPICS_ROOT)?);
        let mut topics = Vec::new();
        for (key, value) in self.store.entries(TOPICS_TABLE)? {
            if !key.starts_with(&prefix) {
                continue;
            }
            match serde_json::from_value::<StoredTopic>(value) {
                Ok(stored) if stored.user_id == user_id => topics.push(stored.topic),
                Ok(_) => {}
                Err(err) => warn!(%key, error = %err, "skipping unreadable topic record"),
            }
        }
        sort_topics(&mut topics);
        Ok(topics)
    }

    async fn delete_topic(&self, user_id: &str, topic_id: &str) -> Result<()> {
        if self.stored_topic(user_id, topic_id)?.is_none() {
            return Err(TopicVaultError::TopicNotFound(topic_id.to_string()));
        }
        self.store
            .delete(TOPICS_TABLE, &topic_key(user_id, topic_id)?)?;

        let root = user_scoped_path(user_id, &topic_root(topic_id))?;
        let files = self.delete_tree(FILES_TABLE, &root)?;
        let dirs = self.delete_tree(DIRECTORIES_TABLE, &root)?;
        info!(user_id, topic_id, files, dirs, "topic deleted");
        Ok(())
    }

    async fn write_file(&self, user_id: &str, path: &str, content: &str) -> Result<()> {
        let key = user_scoped_path(user_id, path)?;
        let record = FileRecord {
            content: content.to_string(),
            size: content.len(),
            last_modified: Utc::now(),
        };
        self.store.put_as(FILES_TABLE, &key, &record)?;
        debug!(path = %key, bytes = record.size, "file written");
        Ok(())
    }

    async fn read_file(&self, user_id: &str, path: &str) -> Result<String> {
        let key = user_scoped_path(user_id, path)?;
        self.store
            .get_as::<FileRecord>(FILES_TABLE, &key)?
            .map(|record| record.content)
            .ok_or_else(|| TopicVaultError::FileNotFound(path.to_string()))
    }

    /// Deleting a missing file is a no-op.
    async fn delete_file(&self, user_id: &str, path: &str) -> Result<()> {
        let key = user_scoped_path(user_id, path)?;
        self.store.delete(FILES_TABLE, &key)
    }

    async fn file_exists(&self, user_id: &str, path: &str) -> Result<bool> {
        let key = user_scoped_path(user_id, path)?;
        Ok(self.store.get(FILES_TABLE, &key)?.is_some())
    }

    async fn create_directory(&self, user_id: &str, path: &str) -> Result<()> {
        let key = user_scoped_path(user_id, path)?;
        if self.store.get(DIRECTORIES_TABLE, &key)?.is_none() {
            self.store.put_as(
                DIRECTORIES_TABLE,
                &key,
                &DirectoryMarker {
                    created: Utc::now(),
                },
            )?;
        }
        Ok(())
    }

    async fn list_directory(&self, user_id: &str, path: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", user_scoped_path(user_id, path)?);
        let mut children: Vec<String> = Vec::new();
        for table in [FILES_TABLE, DIRECTORIES_TABLE] {
            for key in self.store.keys_with_prefix(table, &prefix)? {
                let Some(child) = key[prefix.len()..].split('/').next() else {
                    continue;
                };
                if !child.is_empty() && !is_hidden(child) && !children.iter().any(|c| c == child)
                {
                    children.push(child.to_string());
                }
            }
        }
        Ok(children)
    }

    /// Deleting a missing directory is a no-op.
    async fn delete_directory(&self, user_id: &str, path: &str) -> Result<()> {
        let key = user_scoped_path(user_id, path)?;
        let files = self.delete_tree(FILES_TABLE, &key)?;
        let dirs = self.delete_tree(DIRECTORIES_TABLE, &key)?;
        debug!(path = %key, files, dirs, "directory deleted");
        Ok(())
    }
}

/// `users/{user_id}/topics/{id}`
fn topic_key(user_id: &str, topic_id: &str) -> Result<String> {
    user_scoped_path(user_id, &topic_root(topic_id))
}
