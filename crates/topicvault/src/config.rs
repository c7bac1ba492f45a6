//! # Configuration
//!
//! topicvault configuration is a [`confique`] struct loaded in priority order:
//!
//! 1. **Environment variables**: `TOPICVAULT_BACKEND`, `TOPICVAULT_DATA_DIR`, etc.
//! 2. **Config file**: `topicvault.toml`, when one is passed to [`load_config`].
//! 3. **Compiled defaults**: `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `backend` | `auto` | `auto`, `native`, `virtual-db` or `archive` |
//! | `workspace_root` | none | Folder the native backend is granted without asking |
//! | `data_dir` | OS data dir | Where the key/value databases live |
//! | `downloads_dir` | OS download dir | Where the archive backend delivers files |
//! | `default_user` | `default-user` | Initial user id and native per-user folder |
//! | `app_name` | `topicvault` | Names the hidden per-topic metadata file |
//! | `file_download_spacing_ms` | `400` | Pause after each individually delivered file |
//! | `topic_download_spacing_ms` | `1000` | Pause after each topic in a bulk download |

use crate::error::{Result, TopicVaultError};
use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "topicvault.toml";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendChoice {
    /// Native when a directory picker is available, archive otherwise.
    #[default]
    Auto,
    Native,
    VirtualDb,
    Archive,
}

impl FromStr for BackendChoice {
    type Err = TopicVaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "native" => Ok(Self::Native),
            "virtual-db" | "virtual_db" => Ok(Self::VirtualDb),
            "archive" => Ok(Self::Archive),
            other => Err(TopicVaultError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

#[derive(Config, Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    #[config(default = "auto", env = "TOPICVAULT_BACKEND", parse_env = BackendChoice::from_str)]
    pub backend: BackendChoice,

    #[config(env = "TOPICVAULT_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    #[config(env = "TOPICVAULT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[config(env = "TOPICVAULT_DOWNLOADS_DIR")]
    pub downloads_dir: Option<PathBuf>,

    #[config(default = "default-user", env = "TOPICVAULT_DEFAULT_USER")]
    pub default_user: String,

    #[config(default = "topicvault")]
    pub app_name: String,

    #[config(default = 400, env = "TOPICVAULT_FILE_DOWNLOAD_SPACING_MS")]
    pub file_download_spacing_ms: u64,

    #[config(default = 1000, env = "TOPICVAULT_TOPIC_DOWNLOAD_SPACING_MS")]
    pub topic_download_spacing_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            workspace_root: None,
            data_dir: None,
            downloads_dir: None,
            default_user: "default-user".to_string(),
            app_name: "topicvault".to_string(),
            file_download_spacing_ms: 400,
            topic_download_spacing_ms: 1000,
        }
    }
}

impl VaultConfig {
    pub fn file_download_spacing(&self) -> Duration {
        Duration::from_millis(self.file_download_spacing_ms)
    }

    pub fn topic_download_spacing(&self) -> Duration {
        Duration::from_millis(self.topic_download_spacing_ms)
    }
}

/// Loads configuration from the environment and, if given, a TOML file.
/// A missing file is not an error; defaults apply.
pub fn load_config(file: Option<&Path>) -> Result<VaultConfig> {
    let mut builder = VaultConfig::builder().env();
    if let Some(file) = file {
        builder = builder.file(file);
    }
    builder
        .load()
        .map_err(|err| TopicVaultError::Config(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.backend, BackendChoice::Auto);
        assert_eq!(config.default_user, "default-user");
        assert_eq!(config.file_download_spacing(), Duration::from_millis(400));
        assert_eq!(config.topic_download_spacing(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "backend = \"virtual-db\"\napp_name = \"debate\"\nfile_download_spacing_ms = 0\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.backend, BackendChoice::VirtualDb);
        assert_eq!(config.app_name, "debate");
        assert_eq!(config.file_download_spacing(), Duration::ZERO);
        assert_eq!(config.topic_download_spacing_ms, 1000);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "backend = \"floppy\"\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, TopicVaultError::Config(_)));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Native".parse::<BackendChoice>().unwrap(), BackendChoice::Native);
        assert_eq!("virtual_db".parse::<BackendChoice>().unwrap(), BackendChoice::VirtualDb);
        assert!("tape".parse::<BackendChoice>().is_err());
    }
}
