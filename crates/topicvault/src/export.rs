//! Topic archives.
//!
//! A topic export is a gzip'd tar with a single root folder named after the topic
//! slug. Every folder gets its own directory entry so empty subfolders survive
//! extraction. Hidden files (the metadata file among them) are never included.
//!
//! ```text
//! {slug}/
//! {slug}/overview.md
//! {slug}/arguments/
//! {slug}/arguments/README.md
//! ...
//! ```

use crate::error::{Result, TopicVaultError};
use crate::model::{is_hidden, topic_file_path, topic_root};
use crate::store::StorageAdapter;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A file inside a topic, addressed relative to the topic root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub relative_path: String,
    pub content: String,
}

impl ArchiveEntry {
    pub fn new(relative_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: content.into(),
        }
    }
}

pub fn archive_file_name(slug: &str) -> String {
    format!("{}.tar.gz", slug)
}

/// Builds `{root_name}.tar.gz` bytes from topic-relative entries.
pub fn build_topic_archive(root_name: &str, entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    let visible: Vec<&ArchiveEntry> = entries
        .iter()
        .filter(|e| !e.relative_path.split('/').any(is_hidden))
        .collect();

    let mut folders = BTreeSet::new();
    folders.insert(String::new());
    for entry in &visible {
        let mut parts: Vec<&str> = entry.relative_path.split('/').collect();
        parts.pop();
        for depth in 1..=parts.len() {
            folders.insert(parts[..depth].join("/"));
        }
    }

    let enc = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(enc);

    for folder in &folders {
        let name = if folder.is_empty() {
            format!("{}/", root_name)
        } else {
            format!("{}/{}/", root_name, folder)
        };
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        tar.append_data(&mut header, &name, std::io::empty())
            .map_err(archive_error)?;
    }

    for entry in visible {
        let mut header = tar::Header::new_gnu();
        header.set_size(entry.content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(
            &mut header,
            format!("{}/{}", root_name, entry.relative_path),
            entry.content.as_bytes(),
        )
        .map_err(archive_error)?;
    }

    let enc = tar.into_inner().map_err(archive_error)?;
    enc.finish().map_err(archive_error)
}

/// Reads every file below `topics/{id}/` through the adapter's own primitives.
///
/// Each listed name is asked whether it is a file before anything is read, so
/// extensionless files (`Makefile`, `LICENSE`) are collected and folders with a `.`
/// in their name are descended into. Entries that fail to read or list are skipped.
pub async fn collect_topic_entries(
    adapter: &dyn StorageAdapter,
    user_id: &str,
    topic_id: &str,
) -> Result<Vec<ArchiveEntry>> {
    let mut pending = vec![String::new()];
    let mut entries = Vec::new();

    while let Some(relative_dir) = pending.pop() {
        let names = if relative_dir.is_empty() {
            adapter.list_directory(user_id, &topic_root(topic_id)).await?
        } else {
            let dir = topic_file_path(topic_id, &relative_dir);
            match adapter.list_directory(user_id, &dir).await {
                Ok(names) => names,
                Err(err) => {
                    warn!(topic_id, path = %relative_dir, error = %err, "skipping unreadable folder");
                    continue;
                }
            }
        };
        for name in names {
            let relative = if relative_dir.is_empty() {
                name
            } else {
                format!("{}/{}", relative_dir, name)
            };
            let path = topic_file_path(topic_id, &relative);
            match adapter.file_exists(user_id, &path).await {
                Ok(true) => match adapter.read_file(user_id, &path).await {
                    Ok(content) => entries.push(ArchiveEntry::new(relative, content)),
                    Err(err) => {
                        warn!(topic_id, path = %relative, error = %err, "skipping unreadable file")
                    }
                },
                Ok(false) => pending.push(relative),
                Err(err) => warn!(topic_id, path = %relative, error = %err, "skipping entry"),
            }
        }
    }

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!(topic_id, files = entries.len(), "collected topic files");
    Ok(entries)
}

fn archive_error(err: std::io::Error) -> TopicVaultError {
    TopicVaultError::Archive(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn unpack(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let path = e.path().unwrap().to_string_lossy().into_owned();
                let path = path.trim_end_matches('/').to_string();
                let mut content = String::new();
                e.read_to_string(&mut content).unwrap();
                (path, content)
            })
            .collect()
    }

    #[test]
    fn test_archive_layout() {
        let bytes = build_topic_archive(
            "energy",
            &[
                ArchiveEntry::new("overview.md", "# Energy"),
                ArchiveEntry::new("media/chart.svg", "<svg/>"),
                ArchiveEntry::new(".topicvault-meta.json", "{}"),
            ],
        )
        .unwrap();

        let entries = unpack(&bytes);
        let names: Vec<&str> = entries.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "energy",
                "energy/media",
                "energy/overview.md",
                "energy/media/chart.svg",
            ]
        );
        assert_eq!(entries[2].1, "# Energy");
    }

    #[test]
    fn test_hidden_folders_excluded() {
        let bytes = build_topic_archive(
            "t",
            &[
                ArchiveEntry::new(".cache/x.md", "x"),
                ArchiveEntry::new("a/b/c.md", "c"),
            ],
        )
        .unwrap();
        let names: Vec<String> = unpack(&bytes).into_iter().map(|(p, _)| p).collect();
        assert_eq!(names, vec!["t", "t/a", "t/a/b", "t/a/b/c.md"]);
    }

    #[tokio::test]
    async fn test_collects_extensionless_files_and_dotted_folders() {
        use crate::kv::memory::MemKv;
        use crate::store::virtual_db::VirtualDbAdapter;
        use std::sync::Arc;

        let db = VirtualDbAdapter::new(Arc::new(MemKv::new()), "topicvault");
        db.write_file("u", "topics/t/Makefile", "all:").await.unwrap();
        db.write_file("u", "topics/t/media/LICENSE", "MIT").await.unwrap();
        db.write_file("u", "topics/t/v1.2/notes.md", "n").await.unwrap();

        let entries = collect_topic_entries(&db, "u", "t").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["Makefile", "media/LICENSE", "v1.2/notes.md"]);
        assert_eq!(entries[1].content, "MIT");
    }

    #[test]
    fn test_empty_topic_still_has_root() {
        let bytes = build_topic_archive("empty", &[]).unwrap();
        let names: Vec<String> = unpack(&bytes).into_iter().map(|(p, _)| p).collect();
        assert_eq!(names, vec!["empty"]);
    }
}
