//! # Native-Handle Adapter
//!
//! Stores topics as real folders below a directory the user granted once through a
//! [`DirectoryPicker`]:
//!
//! ```text
//! {granted root}/
//! └── users/{user_id}/
//!     └── topics/{id}/...
//! ```
//!
//! `init` prepares the folder of the configured default user; other users' folders
//! appear on their first write.
//!
//! Virtual paths are resolved segment by segment. File operations treat the
//! terminal segment as the file name, so `Makefile` and `notes.md` are both files.
//! Writes create missing directories on the way down. Reads, existence checks,
//! listings and deletes never create anything: a missing segment is `FileNotFound`,
//! and a missing directory lists empty.
//!
//! ## Linked Folders
//!
//! A topic may be linked to an existing folder anywhere on disk. From then on every
//! path below `topics/{id}/` resolves inside that folder instead of the managed
//! tree. Topic metadata stays in the managed tree. Links belong to one user, are
//! persisted in the [`LinkedFolderRegistry`] and reloaded on `init`.
//!
//! ## Topic Creation
//!
//! Directories first, seed files next, the hidden metadata file last, so a topic
//! directory never looks complete without metadata. Everything this attempt created
//! is journaled and removed again if a later step fails.

use super::picker::{DirectoryPicker, PickPurpose};
use super::registry::{LinkKey, LinkedFolderRegistry};
use super::{sort_topics, DescribesSelectedLocation, LinksFolders, StorageAdapter};
use crate::error::{Result, TopicVaultError};
use crate::model::{
    self, check_user_id, is_hidden, path_segments, split_topic_path, TopicMetadata,
    TopicUpdate, TOPICS_ROOT, USERS_ROOT,
};
use crate::scaffold::{self, Artifact, CreationJournal, TopicScaffold};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a virtual path lands: a base directory plus the segments below it.
struct Location {
    base: PathBuf,
    segments: Vec<String>,
}

impl Location {
    /// Splits off the terminal segment as a file name.
    fn into_file(mut self, path: &str) -> Result<(PathBuf, Vec<String>, String)> {
        let file = self
            .segments
            .pop()
            .ok_or_else(|| TopicVaultError::InvalidPath(format!("{} is not a file path", path)))?;
        Ok((self.base, self.segments, file))
    }
}

pub struct NativeAdapter {
    picker: Arc<dyn DirectoryPicker>,
    registry: LinkedFolderRegistry,
    default_user: String,
    app_name: String,
    metadata_file: String,
    root: RwLock<Option<PathBuf>>,
    linked: RwLock<HashMap<LinkKey, PathBuf>>,
}

impl NativeAdapter {
    pub fn new(
        picker: Arc<dyn DirectoryPicker>,
        registry: LinkedFolderRegistry,
        default_user: impl Into<String>,
        app_name: &str,
    ) -> Self {
        Self {
            picker,
            registry,
            default_user: default_user.into(),
            app_name: app_name.to_string(),
            metadata_file: model::metadata_file_name(app_name),
            root: RwLock::new(None),
            linked: RwLock::new(HashMap::new()),
        }
    }

    /// The granted root, once `init` succeeded.
    pub async fn root(&self) -> Option<PathBuf> {
        self.root.read().await.clone()
    }

    async fn granted_root(&self) -> Result<PathBuf> {
        if let Some(root) = self.root.read().await.as_ref() {
            return Ok(root.clone());
        }
        self.init().await?;
        self.root
            .read()
            .await
            .clone()
            .ok_or_else(|| TopicVaultError::Initialization("no storage root selected".to_string()))
    }

    async fn user_dir(&self, user_id: &str) -> Result<PathBuf> {
        let user = check_user_id(user_id)?;
        Ok(self.granted_root().await?.join(USERS_ROOT).join(user))
    }

    async fn topics_dir(&self, user_id: &str) -> Result<PathBuf> {
        Ok(self.user_dir(user_id).await?.join(TOPICS_ROOT))
    }

    async fn topic_dir(&self, user_id: &str, topic_id: &str) -> Result<PathBuf> {
        match path_segments(topic_id)?.as_slice() {
            [id] if !is_hidden(id) => Ok(self.topics_dir(user_id).await?.join(id)),
            _ => Err(TopicVaultError::InvalidPath(topic_id.to_string())),
        }
    }

    async fn locate(&self, user_id: &str, path: &str) -> Result<Location> {
        let linked_base = match split_topic_path(path) {
            Some((topic_id, rest)) => self
                .linked
                .read()
                .await
                .get(&(user_id.to_string(), topic_id.to_string()))
                .map(|folder| (folder.clone(), rest.to_string())),
            None => None,
        };

        let (base, relative) = match linked_base {
            Some((folder, rest)) => {
                check_user_id(user_id)?;
                debug!(path, folder = %folder.display(), "redirecting to linked folder");
                (folder, rest)
            }
            None => (self.user_dir(user_id).await?, path.to_string()),
        };

        let segments = path_segments(&relative)?
            .into_iter()
            .map(str::to_string)
            .collect();
        Ok(Location { base, segments })
    }

    async fn read_metadata(&self, topic_dir: &Path) -> Result<Option<TopicMetadata>> {
        match fs::read_to_string(topic_dir.join(&self.metadata_file)).await {
            Ok(content) => Ok(Some(scaffold::parse_metadata(&content)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TopicVaultError::Io(err)),
        }
    }

    async fn create_topic_staged(
        &self,
        user_dir: &Path,
        plan: &TopicScaffold,
        journal: &mut CreationJournal,
    ) -> Result<()> {
        fs::create_dir_all(user_dir.join(TOPICS_ROOT)).await?;

        let root = plan.root();
        if ensure_dir(&user_dir.join(&root)).await? {
            journal.created_directory(root.clone());
        }
        for dir in plan.directories() {
            let virtual_dir = plan.path_of(dir);
            if ensure_dir(&user_dir.join(&virtual_dir)).await? {
                journal.created_directory(virtual_dir);
            }
        }

        for seed in plan.seed_files() {
            write_managed(user_dir, &plan.path_of(&seed.relative_path), &seed.content, journal)
                .await?;
        }

        let meta = plan.metadata_file();
        write_managed(user_dir, &plan.path_of(&meta.relative_path), &meta.content, journal).await
    }

    async fn rollback(&self, user_dir: &Path, journal: CreationJournal) {
        for artifact in journal.into_undo_order() {
            let result = match &artifact {
                Artifact::File(path) => fs::remove_file(user_dir.join(path)).await,
                Artifact::Directory(path) => fs::remove_dir_all(user_dir.join(path)).await,
                Artifact::Record { .. } => Ok(()),
            };
            if let Err(err) = result {
                warn!(?artifact, error = %err, "rollback step failed");
            }
        }
    }

    async fn forget_link(&self, user_id: &str, topic_id: &str) {
        let key = (user_id.to_string(), topic_id.to_string());
        if self.linked.write().await.remove(&key).is_some() {
            if let Err(err) = self.registry.unlink(user_id, topic_id) {
                warn!(user_id, topic_id, error = %err, "failed to remove persisted folder link");
            }
        }
    }
}

#[async_trait]
impl StorageAdapter for NativeAdapter {
    async fn init(&self) -> Result<()> {
        let mut granted = self.root.write().await;
        if granted.is_some() {
            return Ok(());
        }

        let root = self.picker.pick_directory(&PickPurpose::StorageRoot).await?;
        let meta = fs::metadata(&root).await.map_err(|err| {
            TopicVaultError::Initialization(format!("cannot access {}: {}", root.display(), err))
        })?;
        if !meta.is_dir() {
            return Err(TopicVaultError::Initialization(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let user_dir = root.join(USERS_ROOT).join(&self.default_user);
        fs::create_dir_all(&user_dir).await.map_err(|err| {
            TopicVaultError::Initialization(format!(
                "cannot prepare {}: {}",
                user_dir.display(),
                err
            ))
        })?;

        match self.registry.load_all() {
            Ok(links) => *self.linked.write().await = links,
            Err(err) => warn!(error = %err, "failed to load linked folders"),
        }

        info!(root = %root.display(), "native storage ready");
        *granted = Some(root);
        Ok(())
    }

    async fn create_topic(&self, user_id: &str, topic: &TopicMetadata) -> Result<()> {
        let topic_dir = self.topic_dir(user_id, &topic.id).await?;
        if self.read_metadata(&topic_dir).await.ok().flatten().is_some() {
            warn!(user_id, topic_id = %topic.id, "topic already exists, overwriting");
        }

        let user_dir = self.user_dir(user_id).await?;
        let plan = TopicScaffold::new(topic, &self.app_name)?;
        let mut journal = CreationJournal::new();
        match self.create_topic_staged(&user_dir, &plan, &mut journal).await {
            Ok(()) => {
                info!(user_id, topic_id = %topic.id, "topic created");
                Ok(())
            }
            Err(err) => {
                warn!(topic_id = %topic.id, error = %err, steps = journal.len(), "topic creation failed, rolling back");
                self.rollback(&user_dir, journal).await;
                Err(err)
            }
        }
    }

    async fn get_topic(&self, user_id: &str, topic_id: &str) -> Result<Option<TopicMetadata>> {
        let topic_dir = self.topic_dir(user_id, topic_id).await?;
        self.read_metadata(&topic_dir).await
    }

    async fn update_topic(
        &self,
        user_id: &str,
        topic_id: &str,
        update: &TopicUpdate,
    ) -> Result<TopicMetadata> {
        let existing = self
            .get_topic(user_id, topic_id)
            .await?
            .ok_or_else(|| TopicVaultError::TopicNotFound(topic_id.to_string()))?;
        let updated = update.apply(&existing, Utc::now())?;

        let topic_dir = self.topic_dir(user_id, topic_id).await?;
        let content = serde_json::to_string_pretty(&updated)?;
        write_atomic(&topic_dir, &self.metadata_file, &content).await?;
        Ok(updated)
    }

    async fn list_topics(&self, user_id: &str) -> Result<Vec<TopicMetadata>> {
        let topics_dir = self.topics_dir(user_id).await?;
        let mut entries = match fs::read_dir(&topics_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(TopicVaultError::Io(err)),
        };

        let mut topics = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match self.read_metadata(&entry.path()).await {
                Ok(Some(topic)) => topics.push(topic),
                Ok(None) => warn!(directory = %name, "skipping directory without topic metadata"),
                Err(err) => warn!(directory = %name, error = %err, "skipping directory with unreadable metadata"),
            }
        }

        sort_topics(&mut topics);
        Ok(topics)
    }

    async fn delete_topic(&self, user_id: &str, topic_id: &str) -> Result<()> {
        let topic_dir = self.topic_dir(user_id, topic_id).await?;
        match fs::remove_dir_all(&topic_dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(TopicVaultError::TopicNotFound(topic_id.to_string()))
            }
            Err(err) => return Err(TopicVaultError::Io(err)),
        }
        self.forget_link(user_id, topic_id).await;
        info!(user_id, topic_id, "topic deleted");
        Ok(())
    }

    async fn write_file(&self, user_id: &str, path: &str, content: &str) -> Result<()> {
        let (base, dirs, file) = self.locate(user_id, path).await?.into_file(path)?;
        let dir = walk(&base, &dirs, true).await?;
        write_atomic(&dir, &file, content).await?;
        debug!(path, bytes = content.len(), "file written");
        Ok(())
    }

    async fn read_file(&self, user_id: &str, path: &str) -> Result<String> {
        let (base, dirs, file) = self.locate(user_id, path).await?.into_file(path)?;
        let dir = walk(&base, &dirs, false)
            .await
            .map_err(|err| not_found_as(err, path))?;
        match fs::read_to_string(dir.join(file)).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(TopicVaultError::FileNotFound(path.to_string()))
            }
            Err(err) => Err(TopicVaultError::Io(err)),
        }
    }

    async fn delete_file(&self, user_id: &str, path: &str) -> Result<()> {
        let (base, dirs, file) = self.locate(user_id, path).await?.into_file(path)?;
        let dir = walk(&base, &dirs, false)
            .await
            .map_err(|err| not_found_as(err, path))?;
        match fs::remove_file(dir.join(file)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(TopicVaultError::FileNotFound(path.to_string()))
            }
            Err(err) => Err(TopicVaultError::Io(err)),
        }
    }

    async fn file_exists(&self, user_id: &str, path: &str) -> Result<bool> {
        let (base, dirs, file) = self.locate(user_id, path).await?.into_file(path)?;
        match walk(&base, &dirs, false).await {
            Ok(dir) => Ok(fs::metadata(dir.join(file))
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn create_directory(&self, user_id: &str, path: &str) -> Result<()> {
        let loc = self.locate(user_id, path).await?;
        walk(&loc.base, &loc.segments, true).await?;
        Ok(())
    }

    async fn list_directory(&self, user_id: &str, path: &str) -> Result<Vec<String>> {
        let loc = self.locate(user_id, path).await?;
        let dir = match walk(&loc.base, &loc.segments, false).await {
            Ok(dir) => dir,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_hidden(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_directory(&self, user_id: &str, path: &str) -> Result<()> {
        let loc = self.locate(user_id, path).await?;
        if loc.segments.is_empty() {
            return Err(TopicVaultError::InvalidPath(format!(
                "refusing to delete storage root via {:?}",
                path
            )));
        }
        let dir = walk(&loc.base, &loc.segments, false)
            .await
            .map_err(|err| not_found_as(err, path))?;
        fs::remove_dir_all(dir).await?;
        Ok(())
    }

    async fn discard_cached_state(&self) -> Result<()> {
        self.linked.write().await.clear();
        Ok(())
    }

    fn as_location(&self) -> Option<&dyn DescribesSelectedLocation> {
        Some(self)
    }

    fn as_folder_linker(&self) -> Option<&dyn LinksFolders> {
        Some(self)
    }
}

impl DescribesSelectedLocation for NativeAdapter {
    fn selected_location_name(&self) -> Option<String> {
        let granted = self.root.try_read().ok()?;
        let root = granted.as_ref()?;
        Some(
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| root.display().to_string()),
        )
    }
}

#[async_trait]
impl LinksFolders for NativeAdapter {
    async fn link_topic_folder(&self, user_id: &str, topic_id: &str) -> Result<()> {
        self.topic_dir(user_id, topic_id).await?;
        let folder = self
            .picker
            .pick_directory(&PickPurpose::LinkTopic(topic_id.to_string()))
            .await?;
        if !fs::metadata(&folder).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(TopicVaultError::InvalidPath(format!(
                "{} is not a directory",
                folder.display()
            )));
        }

        self.registry.link(user_id, topic_id, folder.clone())?;
        info!(user_id, topic_id, folder = %folder.display(), "topic linked to folder");
        self.linked
            .write()
            .await
            .insert((user_id.to_string(), topic_id.to_string()), folder);
        Ok(())
    }

    async fn unlink_topic_folder(&self, user_id: &str, topic_id: &str) -> Result<()> {
        self.linked
            .write()
            .await
            .remove(&(user_id.to_string(), topic_id.to_string()));
        self.registry.unlink(user_id, topic_id)
    }

    async fn is_topic_linked(&self, user_id: &str, topic_id: &str) -> bool {
        self.linked
            .read()
            .await
            .contains_key(&(user_id.to_string(), topic_id.to_string()))
    }

    async fn linked_folder_name(&self, user_id: &str, topic_id: &str) -> Option<String> {
        self.linked
            .read()
            .await
            .get(&(user_id.to_string(), topic_id.to_string()))
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}

async fn write_managed(
    user_dir: &Path,
    virtual_path: &str,
    content: &str,
    journal: &mut CreationJournal,
) -> Result<()> {
    let target = user_dir.join(virtual_path);
    let existed = fs::try_exists(&target).await?;
    let dir = target
        .parent()
        .ok_or_else(|| TopicVaultError::InvalidPath(virtual_path.to_string()))?;
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TopicVaultError::InvalidPath(virtual_path.to_string()))?;
    write_atomic(dir, name, content).await?;
    if !existed {
        journal.created_file(virtual_path);
    }
    Ok(())
}

/// Creates `dir` if missing. Returns whether it was created.
async fn ensure_dir(dir: &Path) -> Result<bool> {
    match fs::create_dir(dir).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(false),
        Err(err) => Err(TopicVaultError::Io(err)),
    }
}

/// Descends from `base` through `dirs`. With `create`, `base` and any missing
/// directory below it are made.
async fn walk(base: &Path, dirs: &[String], create: bool) -> Result<PathBuf> {
    if create {
        fs::create_dir_all(base).await?;
    } else if !fs::try_exists(base).await? {
        return Err(TopicVaultError::FileNotFound(base.display().to_string()));
    }

    let mut current = base.to_path_buf();
    for segment in dirs {
        current.push(segment);
        match fs::metadata(&current).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(TopicVaultError::InvalidPath(format!(
                    "{} is a file",
                    current.display()
                )))
            }
            Err(err) if err.kind() == ErrorKind::NotFound && create => {
                ensure_dir(&current).await?;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(TopicVaultError::FileNotFound(current.display().to_string()))
            }
            Err(err) => return Err(TopicVaultError::Io(err)),
        }
    }
    Ok(current)
}

async fn write_atomic(dir: &Path, file_name: &str, content: &str) -> Result<()> {
    let tmp = dir.join(format!(".{}-{}.tmp", file_name, Uuid::new_v4()));
    fs::write(&tmp, content).await?;
    if let Err(err) = fs::rename(&tmp, dir.join(file_name)).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(TopicVaultError::Io(err));
    }
    Ok(())
}

/// Reports a missing intermediate directory as the virtual path the caller asked for.
fn not_found_as(err: TopicVaultError, path: &str) -> TopicVaultError {
    match err {
        TopicVaultError::FileNotFound(_) => TopicVaultError::FileNotFound(path.to_string()),
        other => other,
    }
}
