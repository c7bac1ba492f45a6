//! # Storage Layer
//!
//! This module defines the storage abstraction for topicvault. The
//! [`StorageAdapter`] trait lets the [`crate::service::TopicService`] facade work
//! against three very different substrates without knowing which one it has.
//!
//! ## Implementations
//!
//! - [`native::NativeAdapter`]: real files and folders below a directory the user
//!   granted through a [`picker::DirectoryPicker`]. Supports linking an existing
//!   folder to a topic.
//! - [`virtual_db::VirtualDbAdapter`]: files and directories emulated as records in
//!   a [`crate::kv::KeyValueStore`]. Directory membership is derived from path
//!   prefixes, never stored.
//! - [`archive::ArchiveAdapter`]: everything in memory, mirrored to a cache database
//!   for reload survival. New topics are handed to a [`download::DownloadSink`] as a
//!   `.tar.gz` archive.
//!
//! ## Contract
//!
//! | Operation | Missing target |
//! |-----------|----------------|
//! | `get_topic` | `Ok(None)` |
//! | `update_topic`, `delete_topic` | `TopicNotFound` |
//! | `read_file` | `FileNotFound` |
//! | `delete_file`, `delete_directory` | adapter-specific, see each impl |
//! | `create_directory` | created; existing directory is a no-op |
//!
//! All writes overwrite. `list_directory` never reports hidden (`.`-prefixed) names.
//! `list_topics` is sorted by `created_at`, newest first.
//!
//! Every operation names the user it acts for. Topics and files of different users
//! never see each other, even under the same slug.
//!
//! ## Capabilities
//!
//! Features only some backends have are exposed through capability traits. An
//! adapter advertises one by overriding the matching `as_*` method; callers ask
//! instead of downcasting:
//!
//! - [`DescribesSelectedLocation`]: a human-readable name for where data lives.
//! - [`LinksFolders`]: redirect a topic to an externally chosen folder.
//! - [`ExportsDownloads`]: hand topics to the user as downloadable archives.
//!
//! ## Storage Layout
//!
//! ```text
//! users/{user_id}/topics/
//! └── {id}/
//!     ├── .{app}-meta.json
//!     ├── overview.md
//!     ├── my-position.md
//!     ├── arguments/  evidence/  practice/  media/
//!     │   └── README.md
//! ```

use crate::error::Result;
use crate::model::{TopicMetadata, TopicUpdate};
use async_trait::async_trait;

pub mod archive;
pub mod download;
pub mod native;
pub mod picker;
pub mod registry;
pub mod virtual_db;

/// Abstract interface for topic storage.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Acquire whatever the backend needs (directory grant, cache reload).
    /// Calling it again after success is a no-op.
    async fn init(&self) -> Result<()>;

    // --- Topic Operations ---

    /// Create the topic's metadata record and seed its file tree.
    async fn create_topic(&self, user_id: &str, topic: &TopicMetadata) -> Result<()>;

    async fn get_topic(&self, user_id: &str, topic_id: &str) -> Result<Option<TopicMetadata>>;

    /// Apply a partial update and return the stored result.
    async fn update_topic(
        &self,
        user_id: &str,
        topic_id: &str,
        update: &TopicUpdate,
    ) -> Result<TopicMetadata>;

    async fn list_topics(&self, user_id: &str) -> Result<Vec<TopicMetadata>>;

    /// Remove the metadata record and every path under `topics/{id}/`.
    async fn delete_topic(&self, user_id: &str, topic_id: &str) -> Result<()>;

    // --- File Operations ---
    //
    // The terminal segment of `path` is the file name, with or without an extension.

    async fn write_file(&self, user_id: &str, path: &str, content: &str) -> Result<()>;

    async fn read_file(&self, user_id: &str, path: &str) -> Result<String>;

    async fn delete_file(&self, user_id: &str, path: &str) -> Result<()>;

    /// True only for files; a directory at `path` reports `false`.
    async fn file_exists(&self, user_id: &str, path: &str) -> Result<bool>;

    // --- Directory Operations ---

    async fn create_directory(&self, user_id: &str, path: &str) -> Result<()>;

    /// Names of the direct children of `path`. A missing directory lists empty.
    async fn list_directory(&self, user_id: &str, path: &str) -> Result<Vec<String>>;

    async fn delete_directory(&self, user_id: &str, path: &str) -> Result<()>;

    /// Forget in-memory state after the backing databases were wiped.
    async fn discard_cached_state(&self) -> Result<()> {
        Ok(())
    }

    // --- Capabilities ---

    fn as_location(&self) -> Option<&dyn DescribesSelectedLocation> {
        None
    }

    fn as_folder_linker(&self) -> Option<&dyn LinksFolders> {
        None
    }

    fn as_exporter(&self) -> Option<&dyn ExportsDownloads> {
        None
    }
}

pub trait DescribesSelectedLocation: Send + Sync {
    /// Display name of the location data is stored in, if one was chosen yet.
    fn selected_location_name(&self) -> Option<String>;
}

#[async_trait]
pub trait LinksFolders: Send + Sync {
    /// Ask the user for a folder and route all of the topic's paths into it.
    async fn link_topic_folder(&self, user_id: &str, topic_id: &str) -> Result<()>;

    /// Drop the link. The topic and the external folder are left untouched.
    async fn unlink_topic_folder(&self, user_id: &str, topic_id: &str) -> Result<()>;

    async fn is_topic_linked(&self, user_id: &str, topic_id: &str) -> bool;

    async fn linked_folder_name(&self, user_id: &str, topic_id: &str) -> Option<String>;
}

#[async_trait]
pub trait ExportsDownloads: Send + Sync {
    /// Deliver one topic as an archive (or its primary files when archiving fails).
    async fn download_topic(&self, user_id: &str, topic_id: &str) -> Result<()>;

    /// Deliver every known topic, pausing between topics.
    async fn download_all_topics(&self, user_id: &str) -> Result<()>;
}

/// Newest first.
pub(crate) fn sort_topics(topics: &mut [TopicMetadata]) {
    topics.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
