//! # Archive/Download Adapter
//!
//! The fallback when no directory can be granted. Topics and files live in memory and
//! are mirrored into the `cache` table of a [`KeyValueStore`] after every mutation, so
//! a restart picks up where the last session left off. Mirroring is best effort: a
//! failed write is logged and the in-memory state stays authoritative.
//!
//! Users get their data out through a [`DownloadSink`]. A newly created topic is
//! delivered immediately as `{slug}.tar.gz`. When the archive cannot be built or
//! delivered, the overview and position documents are delivered as two separate
//! markdown files instead, spaced apart so the platform does not drop the second one.
//!
//! Topic creation stages every seed file first and commits them in one step; there is
//! nothing to roll back.
//!
//! Topic and file keys are `users/{user_id}/...`, so users sharing a slug never see or
//! overwrite each other's documents.

use super::download::{Download, DownloadSink, MIME_GZIP_TAR, MIME_MARKDOWN};
use super::{sort_topics, DescribesSelectedLocation, ExportsDownloads, StorageAdapter};
use crate::error::{Result, TopicVaultError};
use crate::export::{archive_file_name, build_topic_archive, ArchiveEntry};
use crate::kv::{KeyValueExt, KeyValueStore};
use crate::model::{
    is_hidden, topic_root, user_scoped_path, TopicMetadata, TopicUpdate, OVERVIEW_FILE,
    POSITION_FILE, TOPICS_ROOT,
};
use crate::scaffold::TopicScaffold;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const CACHE_TABLE: &str = "cache";
const TOPICS_KEY: &str = "topics";
const FILES_KEY: &str = "files";

pub const LOCATION_DESCRIPTION: &str = "Downloads folder (as archive files - extract to get folders)";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedTopic {
    #[serde(flatten)]
    topic: TopicMetadata,
    user_id: String,
}

#[derive(Debug, Default)]
struct ArchiveState {
    loaded: bool,
    topics: BTreeMap<String, CachedTopic>,
    files: BTreeMap<String, String>,
}

impl ArchiveState {
    fn topic_for(&self, user_id: &str, topic_id: &str) -> Result<Option<&CachedTopic>> {
        Ok(self.topics.get(&topic_key(user_id, topic_id)?))
    }

    /// Topics of one user, in id order.
    fn topics_of(&self, user_id: &str) -> Result<Vec<&CachedTopic>> {
        let prefix = format!("{}/", user_scoped_path(user_id, TOPICS_ROOT)?);
        Ok(self
            .topics
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, t)| t)
            .collect())
    }

    fn entries_of(&self, user_id: &str, topic_id: &str) -> Result<Vec<ArchiveEntry>> {
        let prefix = format!("{}/", topic_key(user_id, topic_id)?);
        Ok(self
            .files
            .iter()
            .filter_map(|(path, content)| {
                path.strip_prefix(&prefix)
                    .map(|relative| ArchiveEntry::new(relative, content.clone()))
            })
            .collect())
    }

    fn remove_tree(&mut self, path: &str) -> usize {
        let below = format!("{}/", path);
        let before = self.files.len();
        self.files
            .retain(|key, _| key != path && !key.starts_with(&below));
        before - self.files.len()
    }
}

pub struct ArchiveAdapter {
    cache: Arc<dyn KeyValueStore>,
    sink: Arc<dyn DownloadSink>,
    app_name: String,
    state: Mutex<ArchiveState>,
    file_spacing: Duration,
    topic_spacing: Duration,
}

impl ArchiveAdapter {
    pub fn new(
        cache: Arc<dyn KeyValueStore>,
        sink: Arc<dyn DownloadSink>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            sink,
            app_name: app_name.into(),
            state: Mutex::new(ArchiveState::default()),
            file_spacing: Duration::from_millis(400),
            topic_spacing: Duration::from_secs(1),
        }
    }

    /// Pause after each individual fallback file and after each topic of a bulk download.
    pub fn with_spacing(mut self, file_spacing: Duration, topic_spacing: Duration) -> Self {
        self.file_spacing = file_spacing;
        self.topic_spacing = topic_spacing;
        self
    }

    fn load(&self, state: &mut ArchiveState) {
        match self.cache.get_as(CACHE_TABLE, TOPICS_KEY) {
            Ok(topics) => state.topics = topics.unwrap_or_default(),
            Err(err) => warn!(error = %err, "failed to reload cached topics, starting empty"),
        }
        match self.cache.get_as(CACHE_TABLE, FILES_KEY) {
            Ok(files) => state.files = files.unwrap_or_default(),
            Err(err) => warn!(error = %err, "failed to reload cached files, starting empty"),
        }
        state.loaded = true;
        debug!(
            topics = state.topics.len(),
            files = state.files.len(),
            "archive cache loaded"
        );
    }

    async fn loaded_state(&self) -> tokio::sync::MutexGuard<'_, ArchiveState> {
        let mut state = self.state.lock().await;
        if !state.loaded {
            self.load(&mut state);
        }
        state
    }

    fn persist(&self, state: &ArchiveState) {
        if let Err(err) = self.cache.put_as(CACHE_TABLE, TOPICS_KEY, &state.topics) {
            warn!(error = %err, "failed to cache topics");
        }
        if let Err(err) = self.cache.put_as(CACHE_TABLE, FILES_KEY, &state.files) {
            warn!(error = %err, "failed to cache files");
        }
    }

    /// Delivers the archive, or the two primary documents when that fails.
    async fn export(&self, topic: &TopicMetadata, entries: Vec<ArchiveEntry>) -> Result<()> {
        let slug = &topic.id;
        let delivered = match build_topic_archive(slug, &entries) {
            Ok(bytes) => {
                self.sink
                    .deliver(Download::new(archive_file_name(slug), MIME_GZIP_TAR, bytes))
                    .await
            }
            Err(err) => Err(err),
        };

        let err = match delivered {
            Ok(()) => {
                info!(topic_id = %slug, "topic archive delivered");
                return Ok(());
            }
            Err(err) => err,
        };
        warn!(topic_id = %slug, error = %err, "archive export failed, delivering documents individually");

        for name in [OVERVIEW_FILE, POSITION_FILE] {
            let content = entries
                .iter()
                .find(|e| e.relative_path == name)
                .map(|e| e.content.clone())
                .unwrap_or_default();
            self.sink
                .deliver(Download::new(
                    format!("{}-{}", slug, name),
                    MIME_MARKDOWN,
                    content.into_bytes(),
                ))
                .await?;
            tokio::time::sleep(self.file_spacing).await;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for ArchiveAdapter {
    async fn init(&self) -> Result<()> {
        let state = self.loaded_state().await;
        info!(topics = state.topics.len(), "archive storage ready");
        Ok(())
    }

    async fn create_topic(&self, user_id: &str, topic: &TopicMetadata) -> Result<()> {
        let plan = TopicScaffold::new(topic, &self.app_name)?;
        let staged: Vec<(String, String)> = plan
            .seed_files()
            .iter()
            .map(|seed| (plan.path_of(&seed.relative_path), seed.content.clone()))
            .map(|(path, content)| Ok((user_scoped_path(user_id, &path)?, content)))
            .collect::<Result<_>>()?;
        let key = topic_key(user_id, &topic.id)?;

        let entries = {
            let mut state = self.loaded_state().await;
            if state.topics.contains_key(&key) {
                warn!(user_id, topic_id = %topic.id, "topic already exists, overwriting");
            }
            state.topics.insert(
                key,
                CachedTopic {
                    topic: topic.clone(),
                    user_id: user_id.to_string(),
                },
            );
            state.files.extend(staged);
            self.persist(&state);
            state.entries_of(user_id, &topic.id)?
        };
        info!(user_id, topic_id = %topic.id, "topic created");

        self.export(topic, entries).await
    }

    async fn get_topic(&self, user_id: &str, topic_id: &str) -> Result<Option<TopicMetadata>> {
        let state = self.loaded_state().await;
        Ok(state.topic_for(user_id, topic_id)?.map(|t| t.topic.clone()))
    }

    async fn update_topic(
        &self,
        user_id: &str,
        topic_id: &str,
        update: &TopicUpdate,
    ) -> Result<TopicMetadata> {
        let mut state = self.loaded_state().await;
        let current = state
            .topic_for(user_id, topic_id)?
            .ok_or_else(|| TopicVaultError::TopicNotFound(topic_id.to_string()))?;
        let updated = update.apply(&current.topic, Utc::now())?;
        state.topics.insert(
            topic_key(user_id, topic_id)?,
            CachedTopic {
                topic: updated.clone(),
                user_id: user_id.to_string(),
            },
        );
        self.persist(&state);
        Ok(updated)
    }

    async fn list_topics(&self, user_id: &str) -> Result<Vec<TopicMetadata>> {
        let state = self.loaded_state().await;
        let mut topics: Vec<TopicMetadata> = state
            .topics_of(user_id)?
            .into_iter()
            .map(|t| t.topic.clone())
            .collect();
        sort_topics(&mut topics);
        Ok(topics)
    }

    async fn delete_topic(&self, user_id: &str, topic_id: &str) -> Result<()> {
        let mut state = self.loaded_state().await;
        let key = topic_key(user_id, topic_id)?;
        if state.topics.remove(&key).is_none() {
            return Err(TopicVaultError::TopicNotFound(topic_id.to_string()));
        }
        let files = state.remove_tree(&key);
        self.persist(&state);
        info!(user_id, topic_id, files, "topic deleted");
        Ok(())
    }

    async fn write_file(&self, user_id: &str, path: &str, content: &str) -> Result<()> {
        let key = user_scoped_path(user_id, path)?;
        let mut state = self.loaded_state().await;
        debug!(path = %key, bytes = content.len(), "file written");
        state.files.insert(key, content.to_string());
        self.persist(&state);
        Ok(())
    }

    async fn read_file(&self, user_id: &str, path: &str) -> Result<String> {
        let key = user_scoped_path(user_id, path)?;
        let state = self.loaded_state().await;
        state
            .files
            .get(&key)
            .cloned()
            .ok_or_else(|| TopicVaultError::FileNotFound(path.to_string()))
    }

    /// Deleting a missing file is a no-op.
    async fn delete_file(&self, user_id: &str, path: &str) -> Result<()> {
        let key = user_scoped_path(user_id, path)?;
        let mut state = self.loaded_state().await;
        if state.files.remove(&key).is_some() {
            self.persist(&state);
        }
        Ok(())
    }

    async fn file_exists(&self, user_id: &str, path: &str) -> Result<bool> {
        let key = user_scoped_path(user_id, path)?;
        Ok(self.loaded_state().await.files.contains_key(&key))
    }

    /// Directories exist implicitly through the files below them.
    async fn create_directory(&self, user_id: &str, path: &str) -> Result<()> {
        user_scoped_path(user_id, path)?;
        Ok(())
    }

    async fn list_directory(&self, user_id: &str, path: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", user_scoped_path(user_id, path)?);
        let state = self.loaded_state().await;
        let mut children: Vec<String> = Vec::new();
        for key in state.files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let child = rest.split('/').next().unwrap_or(rest);
            if !child.is_empty() && !is_hidden(child) && !children.iter().any(|c| c == child) {
                children.push(child.to_string());
            }
        }
        Ok(children)
    }

    async fn delete_directory(&self, user_id: &str, path: &str) -> Result<()> {
        let key = user_scoped_path(user_id, path)?;
        let mut state = self.loaded_state().await;
        if state.remove_tree(&key) > 0 {
            self.persist(&state);
        }
        Ok(())
    }

    async fn discard_cached_state(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.topics.clear();
        state.files.clear();
        state.loaded = true;
        Ok(())
    }

    fn as_location(&self) -> Option<&dyn DescribesSelectedLocation> {
        Some(self)
    }

    fn as_exporter(&self) -> Option<&dyn ExportsDownloads> {
        Some(self)
    }
}

impl DescribesSelectedLocation for ArchiveAdapter {
    fn selected_location_name(&self) -> Option<String> {
        Some(LOCATION_DESCRIPTION.to_string())
    }
}

#[async_trait]
impl ExportsDownloads for ArchiveAdapter {
    async fn download_topic(&self, user_id: &str, topic_id: &str) -> Result<()> {
        let (topic, entries) = {
            let state = self.loaded_state().await;
            let cached = state
                .topic_for(user_id, topic_id)?
                .ok_or_else(|| TopicVaultError::TopicNotFound(topic_id.to_string()))?;
            (cached.topic.clone(), state.entries_of(user_id, topic_id)?)
        };
        self.export(&topic, entries).await
    }

    async fn download_all_topics(&self, user_id: &str) -> Result<()> {
        let ids: Vec<String> = {
            let state = self.loaded_state().await;
            state
                .topics_of(user_id)?
                .into_iter()
                .map(|t| t.topic.id.clone())
                .collect()
        };
        info!(user_id, topics = ids.len(), "downloading all topics");
        for id in ids {
            self.download_topic(user_id, &id).await?;
            tokio::time::sleep(self.topic_spacing).await;
        }
        Ok(())
    }
}

/// `users/{user_id}/topics/{id}`
fn topic_key(user_id: &str, topic_id: &str) -> Result<String> {
    user_scoped_path(user_id, &topic_root(topic_id))
}
