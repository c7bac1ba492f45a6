//! # Wiring
//!
//! Builds a ready [`TopicService`] from a [`VaultConfig`].
//!
//! ## Databases
//!
//! Three independent key/value databases back the system:
//!
//! | Database | Used by |
//! |----------|---------|
//! | `storage` | virtual-database adapter |
//! | `linked-folders` | native adapter's folder links |
//! | `cache` | archive adapter's reload cache |
//!
//! On disk each is a directory of JSON tables below the data directory:
//!
//! ```text
//! {data_dir}/
//! ├── storage/
//! ├── linked-folders/
//! └── cache/
//! ```
//!
//! The data directory is `config.data_dir` when set, otherwise the OS data directory
//! for the app (via the `directories` crate).
//!
//! ## Host Capabilities
//!
//! A [`StorageEnvironment`] bundles what the host platform offers: an optional
//! directory picker and a download sink. [`initialize`] derives both from config:
//! a configured `workspace_root` stands in for the picker, and downloads go to
//! `downloads_dir` or the user's download folder.

use crate::config::VaultConfig;
use crate::error::{Result, TopicVaultError};
use crate::kv::fs::JsonFileKv;
use crate::kv::memory::MemKv;
use crate::kv::KeyValueStore;
use crate::service::TopicService;
use crate::store::download::{DirectorySink, DownloadSink, MemorySink};
use crate::store::picker::{DirectoryPicker, PresetDirectoryPicker};
use directories::{ProjectDirs, UserDirs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const STORAGE_DB: &str = "storage";
pub const LINKED_FOLDERS_DB: &str = "linked-folders";
pub const CACHE_DB: &str = "cache";

#[derive(Clone)]
pub struct Databases {
    pub storage: Arc<dyn KeyValueStore>,
    pub linked_folders: Arc<dyn KeyValueStore>,
    pub cache: Arc<dyn KeyValueStore>,
}

impl Databases {
    pub fn in_memory() -> Self {
        Self {
            storage: Arc::new(MemKv::new()),
            linked_folders: Arc::new(MemKv::new()),
            cache: Arc::new(MemKv::new()),
        }
    }

    pub fn open(data_dir: &Path) -> Self {
        Self {
            storage: Arc::new(JsonFileKv::new(data_dir.join(STORAGE_DB))),
            linked_folders: Arc::new(JsonFileKv::new(data_dir.join(LINKED_FOLDERS_DB))),
            cache: Arc::new(JsonFileKv::new(data_dir.join(CACHE_DB))),
        }
    }

    /// Clears all three databases.
    pub fn wipe(&self) -> Result<()> {
        self.storage.clear()?;
        self.linked_folders.clear()?;
        self.cache.clear()
    }
}

pub struct StorageEnvironment {
    pub picker: Option<Arc<dyn DirectoryPicker>>,
    pub downloads: Arc<dyn DownloadSink>,
    pub databases: Databases,
}

impl StorageEnvironment {
    /// No picker, in-memory databases, downloads kept in memory.
    pub fn in_memory() -> Self {
        Self {
            picker: None,
            downloads: Arc::new(MemorySink::new()),
            databases: Databases::in_memory(),
        }
    }

    pub fn with_picker(mut self, picker: Arc<dyn DirectoryPicker>) -> Self {
        self.picker = Some(picker);
        self
    }

    pub fn with_downloads(mut self, downloads: Arc<dyn DownloadSink>) -> Self {
        self.downloads = downloads;
        self
    }

    pub fn with_databases(mut self, databases: Databases) -> Self {
        self.databases = databases;
        self
    }
}

pub fn resolve_data_dir(config: &VaultConfig) -> Result<PathBuf> {
    if let Some(dir) = &config.data_dir {
        return Ok(dir.clone());
    }
    ProjectDirs::from("", "", &config.app_name)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| TopicVaultError::Config("cannot determine a data directory".to_string()))
}

pub fn resolve_downloads_dir(config: &VaultConfig, data_dir: &Path) -> PathBuf {
    if let Some(dir) = &config.downloads_dir {
        return dir.clone();
    }
    UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| data_dir.join("downloads"))
}

/// Opens the on-disk databases and builds the service for `config`.
pub fn initialize(config: &VaultConfig) -> Result<TopicService> {
    let data_dir = resolve_data_dir(config)?;
    let downloads_dir = resolve_downloads_dir(config, &data_dir);
    debug!(
        data_dir = %data_dir.display(),
        downloads_dir = %downloads_dir.display(),
        "resolved storage directories"
    );

    let picker = config
        .workspace_root
        .as_ref()
        .map(|root| Arc::new(PresetDirectoryPicker::new(root.clone())) as Arc<dyn DirectoryPicker>);

    let env = StorageEnvironment {
        picker,
        downloads: Arc::new(DirectorySink::new(downloads_dir)),
        databases: Databases::open(&data_dir),
    };
    TopicService::from_environment(env, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendChoice;
    use crate::kv::KeyValueExt;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_dirs_win() {
        let dir = TempDir::new().unwrap();
        let config = VaultConfig {
            data_dir: Some(dir.path().join("data")),
            downloads_dir: Some(dir.path().join("dl")),
            ..Default::default()
        };
        let data = resolve_data_dir(&config).unwrap();
        assert_eq!(data, dir.path().join("data"));
        assert_eq!(resolve_downloads_dir(&config, &data), dir.path().join("dl"));
    }

    #[test]
    fn test_open_databases_are_separate() {
        let dir = TempDir::new().unwrap();
        let dbs = Databases::open(dir.path());
        dbs.storage.put_as("t", "k", &1).unwrap();
        assert!(dbs.cache.get("t", "k").unwrap().is_none());
        assert!(dir.path().join(STORAGE_DB).join("t.json").exists());

        dbs.wipe().unwrap();
        assert!(dbs.storage.get("t", "k").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialize_with_workspace_root_uses_native() {
        let dir = TempDir::new().unwrap();
        let config = VaultConfig {
            data_dir: Some(dir.path().join("data")),
            downloads_dir: Some(dir.path().join("dl")),
            workspace_root: Some(dir.path().join("vault")),
            ..Default::default()
        };
        std::fs::create_dir_all(dir.path().join("vault")).unwrap();

        let service = initialize(&config).unwrap();
        assert!(service.is_file_system_api_supported());
        service.ensure_initialized().await.unwrap();
        assert_eq!(service.get_selected_directory_name().as_deref(), Some("vault"));
    }

    #[test]
    fn test_initialize_without_root_falls_back_to_archive() {
        let dir = TempDir::new().unwrap();
        let config = VaultConfig {
            data_dir: Some(dir.path().join("data")),
            downloads_dir: Some(dir.path().join("dl")),
            backend: BackendChoice::Auto,
            ..Default::default()
        };
        let service = initialize(&config).unwrap();
        assert!(!service.is_file_system_api_supported());
        assert!(service.adapter().as_exporter().is_some());
    }
}
