//! # Storage Facade
//!
//! [`TopicService`] is the single entry point UI code talks to. It owns one
//! [`StorageAdapter`], the current user id, and the databases it may be asked to wipe.
//!
//! Every operation first awaits [`TopicService::ensure_initialized`]. Initialization
//! is single-flight: concurrent callers share one in-flight `init`, a success is
//! remembered, and a failure (a dismissed picker, say) is not, so the next call asks
//! again.
//!
//! The facade only ever speaks in `topics/{id}/...` paths, always on behalf of the
//! current user. Where those paths land is the adapter's business.

use crate::config::{BackendChoice, VaultConfig};
use crate::error::{Result, TopicVaultError};
use crate::export::{archive_file_name, build_topic_archive, collect_topic_entries};
use crate::init::{Databases, StorageEnvironment};
use crate::model::{
    self, slugify, topic_file_path, ArgumentDraft, EvidenceDraft, NewTopic, PracticeNote,
    TopicMetadata, TopicUpdate, OVERVIEW_FILE, POSITION_FILE, README_FILE,
};
use crate::search::{find_matches, SearchHit};
use crate::store::archive::ArchiveAdapter;
use crate::store::download::{Download, MIME_GZIP_TAR, MIME_MARKDOWN};
use crate::store::native::NativeAdapter;
use crate::store::registry::LinkedFolderRegistry;
use crate::store::virtual_db::VirtualDbAdapter;
use crate::store::StorageAdapter;
use crate::template;
use crate::template_vars;
use chrono::Utc;
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const SEARCHED_DIRECTORIES: [&str; 3] = ["arguments", "evidence", "practice"];

pub struct TopicService {
    adapter: Arc<dyn StorageAdapter>,
    user_id: RwLock<String>,
    initialized: OnceCell<()>,
    databases: Databases,
    picker_available: bool,
}

impl TopicService {
    pub fn new(adapter: Arc<dyn StorageAdapter>, databases: Databases, user_id: &str) -> Self {
        Self {
            adapter,
            user_id: RwLock::new(user_id.to_string()),
            initialized: OnceCell::new(),
            databases,
            picker_available: false,
        }
    }

    /// Records whether the host can show a directory picker.
    pub fn with_picker_support(mut self, available: bool) -> Self {
        self.picker_available = available;
        self
    }

    /// Chooses and builds the adapter for `config.backend`.
    ///
    /// `auto` prefers native storage when a picker is available and falls back to
    /// archive downloads otherwise.
    pub fn from_environment(env: StorageEnvironment, config: &VaultConfig) -> Result<Self> {
        let StorageEnvironment {
            picker,
            downloads,
            databases,
        } = env;
        let picker_available = picker.is_some();

        let backend = match (config.backend, picker.is_some()) {
            (BackendChoice::Auto, true) => BackendChoice::Native,
            (BackendChoice::Auto, false) => BackendChoice::Archive,
            (choice, _) => choice,
        };

        let adapter: Arc<dyn StorageAdapter> = match backend {
            BackendChoice::Native => {
                let picker = picker.ok_or_else(|| {
                    TopicVaultError::Initialization(
                        "native storage requires a directory picker".to_string(),
                    )
                })?;
                Arc::new(NativeAdapter::new(
                    picker,
                    LinkedFolderRegistry::new(databases.linked_folders.clone()),
                    config.default_user.clone(),
                    &config.app_name,
                ))
            }
            BackendChoice::VirtualDb => Arc::new(VirtualDbAdapter::new(
                databases.storage.clone(),
                config.app_name.clone(),
            )),
            BackendChoice::Archive | BackendChoice::Auto => Arc::new(
                ArchiveAdapter::new(databases.cache.clone(), downloads, config.app_name.clone())
                    .with_spacing(
                        config.file_download_spacing(),
                        config.topic_download_spacing(),
                    ),
            ),
        };
        info!(?backend, "storage backend selected");

        Ok(Self::new(adapter, databases, &config.default_user).with_picker_support(picker_available))
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    // --- Lifecycle ---

    pub async fn ensure_initialized(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async { self.adapter.init().await })
            .await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        if let Ok(mut current) = self.user_id.write() {
            *current = user_id.into();
        }
    }

    pub fn current_user_id(&self) -> String {
        self.user_id
            .read()
            .map(|id| id.clone())
            .unwrap_or_default()
    }

    pub fn is_file_system_api_supported(&self) -> bool {
        self.picker_available
    }

    pub fn get_selected_directory_name(&self) -> Option<String> {
        self.adapter
            .as_location()
            .and_then(|location| location.selected_location_name())
    }

    /// Clears every database this service was built with and drops adapter caches.
    /// Files written into a native directory are left alone.
    pub async fn wipe_all_data(&self) -> Result<()> {
        self.databases.wipe()?;
        self.adapter.discard_cached_state().await?;
        info!("all stored data wiped");
        Ok(())
    }

    // --- Topics ---

    pub async fn create_topic_from_browser_topic(&self, new_topic: &NewTopic) -> Result<TopicMetadata> {
        self.ensure_initialized().await?;
        let topic = TopicMetadata::from_new_topic(new_topic, Utc::now())?;
        self.adapter
            .create_topic(&self.current_user_id(), &topic)
            .await?;
        Ok(topic)
    }

    pub async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicMetadata>> {
        self.ensure_initialized().await?;
        self.adapter
            .get_topic(&self.current_user_id(), topic_id)
            .await
    }

    pub async fn update_topic(&self, topic_id: &str, update: &TopicUpdate) -> Result<TopicMetadata> {
        self.ensure_initialized().await?;
        self.adapter
            .update_topic(&self.current_user_id(), topic_id, update)
            .await
    }

    pub async fn list_topics(&self) -> Result<Vec<TopicMetadata>> {
        self.ensure_initialized().await?;
        self.adapter.list_topics(&self.current_user_id()).await
    }

    pub async fn delete_topic(&self, topic_id: &str) -> Result<()> {
        self.ensure_initialized().await?;
        self.adapter
            .delete_topic(&self.current_user_id(), topic_id)
            .await
    }

    // --- Documents ---

    pub async fn get_topic_overview(&self, topic_id: &str) -> Result<String> {
        self.read_topic_file(topic_id, OVERVIEW_FILE).await
    }

    pub async fn update_topic_overview(&self, topic_id: &str, content: &str) -> Result<()> {
        self.write_topic_file(topic_id, OVERVIEW_FILE, content).await
    }

    pub async fn get_topic_position(&self, topic_id: &str) -> Result<String> {
        self.read_topic_file(topic_id, POSITION_FILE).await
    }

    pub async fn update_topic_position(&self, topic_id: &str, content: &str) -> Result<()> {
        self.write_topic_file(topic_id, POSITION_FILE, content).await
    }

    // --- Arguments, evidence, practice ---

    /// Writes `arguments/{slug}.md` and returns the slug.
    pub async fn create_argument(&self, topic_id: &str, draft: &ArgumentDraft) -> Result<String> {
        let argument_id = non_empty_slug(&draft.title)?;
        model::check_scale("strength", draft.strength, 5)?;
        let content = template::ARGUMENT.render(&template_vars! {
            "title" => draft.title.as_str(),
            "type" => draft.kind.as_str(),
            "strength" => draft.strength,
            "created_at" => Utc::now().to_rfc3339(),
            "content" => draft.content.as_str(),
            "evidence_ids" => draft.evidence_ids.clone(),
        });
        self.write_topic_file(topic_id, &argument_path(&argument_id), &content)
            .await?;
        Ok(argument_id)
    }

    pub async fn get_argument(&self, topic_id: &str, argument_id: &str) -> Result<String> {
        self.read_topic_file(topic_id, &argument_path(argument_id))
            .await
    }

    pub async fn update_argument(&self, topic_id: &str, argument_id: &str, content: &str) -> Result<()> {
        self.write_topic_file(topic_id, &argument_path(argument_id), content)
            .await
    }

    /// Argument ids of the topic. A listing failure yields an empty list.
    pub async fn list_arguments(&self, topic_id: &str) -> Result<Vec<String>> {
        self.ensure_initialized().await?;
        let names = match self
            .adapter
            .list_directory(&self.current_user_id(), &topic_file_path(topic_id, "arguments"))
            .await
        {
            Ok(names) => names,
            Err(err) => {
                debug!(topic_id, error = %err, "cannot list arguments");
                return Ok(Vec::new());
            }
        };
        Ok(markdown_stems(names))
    }

    /// Writes `evidence/{slug}.md` and returns the slug.
    pub async fn create_evidence(&self, topic_id: &str, draft: &EvidenceDraft) -> Result<String> {
        let evidence_id = non_empty_slug(&draft.title)?;
        model::check_scale("credibility", draft.credibility, 5)?;
        let content = template::EVIDENCE.render(&template_vars! {
            "title" => draft.title.as_str(),
            "type" => draft.kind.as_str(),
            "source" => draft.source.as_str(),
            "credibility" => draft.credibility,
            "created_at" => Utc::now().to_rfc3339(),
            "content" => draft.content.as_str(),
            "source_url" => draft.source_url.clone(),
        });
        self.write_topic_file(topic_id, &format!("evidence/{}.md", evidence_id), &content)
            .await?;
        Ok(evidence_id)
    }

    /// Writes `practice/session-{millis}.md` and returns the session id.
    pub async fn add_practice_note(&self, topic_id: &str, note: &PracticeNote) -> Result<String> {
        model::check_scale("rating", note.rating, 5)?;
        let now = Utc::now();
        let session_id = format!("session-{}", now.timestamp_millis());
        let content = template::PRACTICE.render(&template_vars! {
            "session_date" => now.format("%Y-%m-%d").to_string(),
            "rating" => note.rating,
            "performance_notes" => note.performance_notes.as_str(),
            "strengths" => note.strengths.clone(),
            "areas_for_improvement" => note.areas_for_improvement.clone(),
            "ai_feedback" => note.ai_feedback.clone(),
        });
        self.write_topic_file(topic_id, &format!("practice/{}.md", session_id), &content)
            .await?;
        Ok(session_id)
    }

    // --- Search and export ---

    /// Case-insensitive search over the topic's markdown documents.
    ///
    /// Unreadable files are skipped. Hits are ordered overview, position, then
    /// arguments, evidence and practice files in listing order.
    pub async fn search_topic_content(&self, topic_id: &str, query: &str) -> Result<Vec<SearchHit>> {
        self.ensure_initialized().await?;
        let user_id = self.current_user_id();

        let mut files = vec![OVERVIEW_FILE.to_string(), POSITION_FILE.to_string()];
        for dir in SEARCHED_DIRECTORIES {
            match self
                .adapter
                .list_directory(&user_id, &topic_file_path(topic_id, dir))
                .await
            {
                Ok(names) => files.extend(
                    markdown_stems(names)
                        .into_iter()
                        .map(|stem| format!("{}/{}.md", dir, stem)),
                ),
                Err(err) => warn!(topic_id, dir, error = %err, "search skipped directory"),
            }
        }

        let mut hits = Vec::new();
        for file in files {
            let content = match self
                .adapter
                .read_file(&user_id, &topic_file_path(topic_id, &file))
                .await
            {
                Ok(content) => content,
                Err(err) => {
                    debug!(topic_id, file = %file, error = %err, "search skipped file");
                    continue;
                }
            };
            let matches = find_matches(&content, query);
            if !matches.is_empty() {
                hits.push(SearchHit { file, matches });
            }
        }
        Ok(hits)
    }

    /// The overview document as a markdown download.
    pub async fn export_topic_as_obsidian_vault(&self, topic_id: &str) -> Result<Download> {
        let overview = self.get_topic_overview(topic_id).await?;
        Ok(Download::new(
            format!("{}-{}", topic_id, OVERVIEW_FILE),
            MIME_MARKDOWN,
            overview.into_bytes(),
        ))
    }

    /// Every visible file of the topic as a `{id}.tar.gz` download.
    pub async fn export_topic_archive(&self, topic_id: &str) -> Result<Download> {
        self.ensure_initialized().await?;
        let user_id = self.current_user_id();
        if self.adapter.get_topic(&user_id, topic_id).await?.is_none() {
            return Err(TopicVaultError::TopicNotFound(topic_id.to_string()));
        }
        let entries = collect_topic_entries(self.adapter.as_ref(), &user_id, topic_id).await?;
        let bytes = build_topic_archive(topic_id, &entries)?;
        Ok(Download::new(archive_file_name(topic_id), MIME_GZIP_TAR, bytes))
    }

    /// Hands every topic to the download sink. Only archive storage can do this.
    pub async fn download_all_topics(&self) -> Result<()> {
        self.ensure_initialized().await?;
        let exporter = self.adapter.as_exporter().ok_or_else(|| {
            TopicVaultError::Unsupported("bulk download".to_string())
        })?;
        exporter.download_all_topics(&self.current_user_id()).await
    }

    // --- Linked folders ---

    pub async fn link_topic_folder(&self, topic_id: &str) -> Result<()> {
        self.ensure_initialized().await?;
        let linker = self.adapter.as_folder_linker().ok_or_else(|| {
            TopicVaultError::Unsupported("linking folders".to_string())
        })?;
        linker
            .link_topic_folder(&self.current_user_id(), topic_id)
            .await
    }

    pub async fn unlink_topic_folder(&self, topic_id: &str) -> Result<()> {
        self.ensure_initialized().await?;
        let linker = self.adapter.as_folder_linker().ok_or_else(|| {
            TopicVaultError::Unsupported("linking folders".to_string())
        })?;
        linker
            .unlink_topic_folder(&self.current_user_id(), topic_id)
            .await
    }

    /// Name of the folder the topic is linked to, if any.
    ///
    /// Links are loaded by `init`, so this initializes first like every other call.
    pub async fn linked_folder_name(&self, topic_id: &str) -> Result<Option<String>> {
        self.ensure_initialized().await?;
        Ok(match self.adapter.as_folder_linker() {
            Some(linker) => {
                linker
                    .linked_folder_name(&self.current_user_id(), topic_id)
                    .await
            }
            None => None,
        })
    }

    async fn read_topic_file(&self, topic_id: &str, relative: &str) -> Result<String> {
        self.ensure_initialized().await?;
        self.adapter
            .read_file(&self.current_user_id(), &topic_file_path(topic_id, relative))
            .await
    }

    async fn write_topic_file(&self, topic_id: &str, relative: &str, content: &str) -> Result<()> {
        self.ensure_initialized().await?;
        self.adapter
            .write_file(
                &self.current_user_id(),
                &topic_file_path(topic_id, relative),
                content,
            )
            .await
    }
}

fn argument_path(argument_id: &str) -> String {
    format!("arguments/{}.md", argument_id)
}

fn non_empty_slug(title: &str) -> Result<String> {
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(TopicVaultError::Validation(format!(
            "title {:?} has no usable characters",
            title
        )));
    }
    Ok(slug)
}

/// `.md` names other than the README, extension stripped.
fn markdown_stems(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| name != README_FILE)
        .filter_map(|name| name.strip_suffix(".md").map(str::to_string))
        .filter(|stem| !model::is_hidden(stem))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_stems() {
        let names = vec![
            "README.md".to_string(),
            "cost.md".to_string(),
            "chart.png".to_string(),
            "jobs.md".to_string(),
        ];
        assert_eq!(markdown_stems(names), vec!["cost", "jobs"]);
    }

    #[test]
    fn test_non_empty_slug() {
        assert_eq!(non_empty_slug("Cost of Energy").unwrap(), "cost-of-energy");
        assert!(matches!(
            non_empty_slug("!!!"),
            Err(TopicVaultError::Validation(_))
        ));
    }
}
