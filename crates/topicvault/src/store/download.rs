//! Download delivery.
//!
//! A [`DownloadSink`] stands for the platform's "save this file" mechanism. The
//! archive adapter produces bytes; the sink decides where they end up.

use crate::error::{Result, TopicVaultError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_GZIP_TAR: &str = "application/gzip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn new(file_name: impl Into<String>, mime_type: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type,
            bytes,
        }
    }
}

#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn deliver(&self, download: Download) -> Result<()>;
}

/// Saves downloads into a directory, overwriting files of the same name.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn deliver(&self, download: Download) -> Result<()> {
        let name = Path::new(&download.file_name)
            .file_name()
            .ok_or_else(|| TopicVaultError::InvalidPath(download.file_name.clone()))?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Atomic write
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!(".download-{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, &download.bytes).await?;
        tokio::fs::rename(&tmp, &target).await?;

        debug!(path = %target.display(), bytes = download.bytes.len(), "download saved");
        Ok(())
    }
}

/// Keeps every delivered download in memory, in delivery order.
#[derive(Default)]
pub struct MemorySink {
    deliveries: Mutex<Vec<Download>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Download> {
        self.deliveries
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .map(|d| d.file_name)
            .collect()
    }

    /// Remove and return everything delivered so far.
    pub fn take(&self) -> Vec<Download> {
        self.deliveries
            .lock()
            .map(|mut d| std::mem::take(&mut *d))
            .unwrap_or_default()
    }
}

#[async_trait]
impl DownloadSink for MemorySink {
    async fn deliver(&self, download: Download) -> Result<()> {
        self.deliveries
            .lock()
            .map_err(|_| TopicVaultError::Store("download sink lock poisoned".to_string()))?
            .push(download);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_directory_sink_writes_file() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path().join("downloads"));
        sink.deliver(Download::new("a.md", MIME_MARKDOWN, b"hello".to_vec()))
            .await
            .unwrap();
        let written = std::fs::read_to_string(dir.path().join("downloads/a.md")).unwrap();
        assert_eq!(written, "hello");
    }

    #[tokio::test]
    async fn test_directory_sink_strips_directories_from_name() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path());
        sink.deliver(Download::new("../../evil.md", MIME_MARKDOWN, b"x".to_vec()))
            .await
            .unwrap();
        assert!(dir.path().join("evil.md").exists());
    }

    #[tokio::test]
    async fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.deliver(Download::new("1", MIME_MARKDOWN, vec![])).await.unwrap();
        sink.deliver(Download::new("2", MIME_MARKDOWN, vec![])).await.unwrap();
        assert_eq!(sink.file_names(), vec!["1", "2"]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.deliveries().is_empty());
    }
}
