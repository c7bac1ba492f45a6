use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use topicvault::config::{BackendChoice, VaultConfig};
use topicvault::error::{Result, TopicVaultError};
use topicvault::init::{Databases, StorageEnvironment};
use topicvault::kv::memory::MemKv;
use topicvault::model::{ArgumentDraft, EvidenceDraft, NewTopic, PracticeNote, TopicUpdate};
use topicvault::service::TopicService;
use topicvault::store::download::{MIME_GZIP_TAR, MIME_MARKDOWN};
use topicvault::store::native::NativeAdapter;
use topicvault::store::picker::{DirectoryPicker, PickPurpose, PresetDirectoryPicker};
use topicvault::store::registry::LinkedFolderRegistry;
use topicvault::store::virtual_db::VirtualDbAdapter;

/// Grants `root` after dismissing the first `cancel_first` requests.
struct CountingPicker {
    root: PathBuf,
    calls: AtomicUsize,
    cancel_first: usize,
}

impl CountingPicker {
    fn new(root: PathBuf, cancel_first: usize) -> Self {
        Self {
            root,
            calls: AtomicUsize::new(0),
            cancel_first,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryPicker for CountingPicker {
    async fn pick_directory(&self, _purpose: &PickPurpose) -> Result<PathBuf> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if call < self.cancel_first {
            return Err(TopicVaultError::UserCancelled);
        }
        Ok(self.root.clone())
    }
}

fn native_service(picker: Arc<CountingPicker>) -> TopicService {
    let adapter = NativeAdapter::new(
        picker,
        LinkedFolderRegistry::new(Arc::new(MemKv::new())),
        "default-user",
        "topicvault",
    );
    TopicService::new(Arc::new(adapter), Databases::in_memory(), "default-user")
        .with_picker_support(true)
}

fn virtual_service() -> TopicService {
    let databases = Databases::in_memory();
    let adapter = VirtualDbAdapter::new(databases.storage.clone(), "topicvault");
    TopicService::new(Arc::new(adapter), databases, "default-user")
}

fn config(backend: BackendChoice) -> VaultConfig {
    VaultConfig {
        backend,
        ..Default::default()
    }
}

fn archive_paths(bytes: &[u8]) -> Vec<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            entry
                .unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string()
        })
        .collect()
}

#[tokio::test]
async fn test_concurrent_initialization_runs_once() {
    let root = TempDir::new().unwrap();
    let picker = Arc::new(CountingPicker::new(root.path().to_path_buf(), 0));
    let service = native_service(picker.clone());

    let (a, b, c, d) = tokio::join!(
        service.ensure_initialized(),
        service.ensure_initialized(),
        service.list_topics(),
        service.ensure_initialized(),
    );
    a.unwrap();
    b.unwrap();
    assert!(c.unwrap().is_empty());
    d.unwrap();

    assert_eq!(picker.calls(), 1);
    assert!(service.is_initialized());
    service.ensure_initialized().await.unwrap();
    assert_eq!(picker.calls(), 1);
}

#[tokio::test]
async fn test_cancelled_picker_is_retried() {
    let root = TempDir::new().unwrap();
    let picker = Arc::new(CountingPicker::new(root.path().to_path_buf(), 1));
    let service = native_service(picker.clone());

    let err = service.ensure_initialized().await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!service.is_initialized());

    let topic = service
        .create_topic_from_browser_topic(&NewTopic::new("Nuclear Power"))
        .await
        .unwrap();
    assert_eq!(picker.calls(), 2);
    assert!(root
        .path()
        .join("users/default-user/topics/nuclear-power/overview.md")
        .is_file());
    assert_eq!(service.get_topic(&topic.id).await.unwrap(), Some(topic));
}

#[tokio::test]
async fn test_topic_documents_end_to_end() {
    let service = virtual_service();
    let topic = service
        .create_topic_from_browser_topic(
            &NewTopic::new("Universal Basic Income").with_category("Economics"),
        )
        .await
        .unwrap();
    assert_eq!(topic.id, "universal-basic-income");
    assert_eq!(topic.category, "Economics");

    let overview = service.get_topic_overview(&topic.id).await.unwrap();
    assert!(overview.starts_with("# Universal Basic Income"));
    service
        .update_topic_overview(&topic.id, "# UBI\n\nPilot programs")
        .await
        .unwrap();
    assert_eq!(
        service.get_topic_overview(&topic.id).await.unwrap(),
        "# UBI\n\nPilot programs"
    );

    let position = service.get_topic_position(&topic.id).await.unwrap();
    assert!(position.contains("My Position on Universal Basic Income"));
    service
        .update_topic_position(&topic.id, "Strongly in favour")
        .await
        .unwrap();
    assert_eq!(
        service.get_topic_position(&topic.id).await.unwrap(),
        "Strongly in favour"
    );

    let updated = service
        .update_topic(
            &topic.id,
            &TopicUpdate {
                conviction: Some(8),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.conviction, 8);
}

#[tokio::test]
async fn test_arguments_evidence_and_practice() {
    let service = virtual_service();
    let topic = service
        .create_topic_from_browser_topic(&NewTopic::new("Universal Basic Income"))
        .await
        .unwrap();

    assert!(service.list_arguments(&topic.id).await.unwrap().is_empty());

    let argument = service
        .create_argument(
            &topic.id,
            &ArgumentDraft::new("Cost of Living", "Reduces poverty").with_strength(4),
        )
        .await
        .unwrap();
    assert_eq!(argument, "cost-of-living");
    assert!(service
        .get_argument(&topic.id, &argument)
        .await
        .unwrap()
        .contains("Reduces poverty"));
    service
        .update_argument(&topic.id, &argument, "# Rewritten")
        .await
        .unwrap();
    assert_eq!(
        service.get_argument(&topic.id, &argument).await.unwrap(),
        "# Rewritten"
    );
    assert_eq!(
        service.list_arguments(&topic.id).await.unwrap(),
        vec!["cost-of-living"]
    );

    let evidence = service
        .create_evidence(
            &topic.id,
            &EvidenceDraft::new("Finland Trial", "Wellbeing improved")
                .with_source("Kela")
                .with_source_url("https://example.org/finland"),
        )
        .await
        .unwrap();
    assert_eq!(evidence, "finland-trial");

    let session = service
        .add_practice_note(&topic.id, &PracticeNote::new("Ran long").with_rating(2))
        .await
        .unwrap();
    assert!(session.starts_with("session-"));

    let err = service
        .create_argument(&topic.id, &ArgumentDraft::new("Weak", "").with_strength(6))
        .await
        .unwrap_err();
    assert!(matches!(err, TopicVaultError::Validation(_)));
    let err = service
        .create_evidence(&topic.id, &EvidenceDraft::new("???", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, TopicVaultError::Validation(_)));
}

#[tokio::test]
async fn test_search_orders_hits_by_document() {
    let service = virtual_service();
    let topic = service
        .create_topic_from_browser_topic(&NewTopic::new("Energy"))
        .await
        .unwrap();
    service
        .update_topic_position(&topic.id, "Nuclear is the answer")
        .await
        .unwrap();
    service
        .create_argument(&topic.id, &ArgumentDraft::new("Baseload", "Nuclear runs all night"))
        .await
        .unwrap();
    service
        .create_evidence(&topic.id, &EvidenceDraft::new("Costs", "Solar keeps getting cheaper"))
        .await
        .unwrap();

    let hits = service.search_topic_content(&topic.id, "NUCLEAR").await.unwrap();
    let files: Vec<&str> = hits.iter().map(|h| h.file.as_str()).collect();
    assert_eq!(files, vec!["my-position.md", "arguments/baseload.md"]);
    assert_eq!(hits[0].matches, vec!["Nuclear is the answer"]);

    // An empty query matches every line of every document.
    let all = service.search_topic_content(&topic.id, "").await.unwrap();
    let files: Vec<&str> = all.iter().map(|h| h.file.as_str()).collect();
    assert_eq!(
        files,
        vec![
            "overview.md",
            "my-position.md",
            "arguments/baseload.md",
            "evidence/costs.md"
        ]
    );
    assert_eq!(all[1].matches, vec!["Nuclear is the answer"]);
}

#[tokio::test]
async fn test_export_topic_archive() {
    let service = virtual_service();
    let topic = service
        .create_topic_from_browser_topic(&NewTopic::new("Energy"))
        .await
        .unwrap();
    service
        .adapter()
        .write_file("default-user", "topics/energy/media/chart.svg", "<svg/>")
        .await
        .unwrap();

    let download = service.export_topic_archive(&topic.id).await.unwrap();
    assert_eq!(download.file_name, "energy.tar.gz");
    assert_eq!(download.mime_type, MIME_GZIP_TAR);
    let paths = archive_paths(&download.bytes);
    assert!(paths.iter().any(|p| p == "energy/media/chart.svg"));
    assert!(paths.iter().any(|p| p == "energy/practice"));
    assert!(!paths.iter().any(|p| p.contains(".topicvault-meta")));

    let err = service.export_topic_archive("missing").await.unwrap_err();
    assert!(matches!(err, TopicVaultError::TopicNotFound(_)));
}

#[tokio::test]
async fn test_export_overview_document() {
    let service = virtual_service();
    let topic = service
        .create_topic_from_browser_topic(&NewTopic::new("Energy"))
        .await
        .unwrap();
    let download = service
        .export_topic_as_obsidian_vault(&topic.id)
        .await
        .unwrap();
    assert_eq!(download.file_name, "energy-overview.md");
    assert_eq!(download.mime_type, MIME_MARKDOWN);
    assert!(String::from_utf8(download.bytes).unwrap().starts_with("# Energy"));
}

#[tokio::test]
async fn test_capabilities_are_gated() {
    let service = virtual_service();
    let err = service.download_all_topics().await.unwrap_err();
    assert!(matches!(err, TopicVaultError::Unsupported(_)));
    let err = service.link_topic_folder("energy").await.unwrap_err();
    assert!(matches!(err, TopicVaultError::Unsupported(_)));
    assert!(service.linked_folder_name("energy").await.unwrap().is_none());
    assert!(service.get_selected_directory_name().is_none());
    assert!(!service.is_file_system_api_supported());

    let archive = TopicService::from_environment(
        StorageEnvironment::in_memory(),
        &config(BackendChoice::Archive),
    )
    .unwrap();
    let err = archive.unlink_topic_folder("energy").await.unwrap_err();
    assert!(matches!(err, TopicVaultError::Unsupported(_)));
    archive.download_all_topics().await.unwrap();
}

#[tokio::test]
async fn test_users_are_isolated() {
    let service = virtual_service();
    assert_eq!(service.current_user_id(), "default-user");
    service
        .create_topic_from_browser_topic(&NewTopic::new("Energy"))
        .await
        .unwrap();

    service.set_user_id("debater-2");
    assert_eq!(service.current_user_id(), "debater-2");
    assert!(service.list_topics().await.unwrap().is_empty());
    assert!(service.get_topic("energy").await.unwrap().is_none());

    assert!(service.get_topic_overview("energy").await.unwrap_err().is_not_found());

    // Same slug for a second user leaves the first user's documents alone.
    service
        .create_topic_from_browser_topic(&NewTopic::new("Energy"))
        .await
        .unwrap();
    service
        .update_topic_overview("energy", "debater-2 notes")
        .await
        .unwrap();
    service.delete_topic("energy").await.unwrap();

    service.set_user_id("default-user");
    assert_eq!(service.list_topics().await.unwrap().len(), 1);
    assert!(service
        .get_topic_overview("energy")
        .await
        .unwrap()
        .starts_with("# Energy"));
}

#[tokio::test]
async fn test_linked_folder_name_initializes_first() {
    let root = TempDir::new().unwrap();
    let external = TempDir::new().unwrap();
    let links: Arc<MemKv> = Arc::new(MemKv::new());
    LinkedFolderRegistry::new(links.clone())
        .link("default-user", "energy", external.path().to_path_buf())
        .unwrap();

    let adapter = NativeAdapter::new(
        Arc::new(PresetDirectoryPicker::new(root.path())),
        LinkedFolderRegistry::new(links),
        "default-user",
        "topicvault",
    );
    let service = TopicService::new(Arc::new(adapter), Databases::in_memory(), "default-user");

    let name = service.linked_folder_name("energy").await.unwrap();
    assert!(service.is_initialized());
    assert_eq!(
        name,
        external
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    );
}

#[tokio::test]
async fn test_reading_unknown_topic_creates_no_folders() {
    let root = TempDir::new().unwrap();
    let picker = Arc::new(CountingPicker::new(root.path().to_path_buf(), 0));
    let service = native_service(picker);

    assert!(service.list_arguments("ghost").await.unwrap().is_empty());
    assert!(service.search_topic_content("ghost", "x").await.unwrap().is_empty());
    assert!(!root.path().join("users/default-user/topics/ghost").exists());
}

#[tokio::test]
async fn test_wipe_all_data() {
    let service = virtual_service();
    service
        .create_topic_from_browser_topic(&NewTopic::new("Energy"))
        .await
        .unwrap();
    service.wipe_all_data().await.unwrap();
    assert!(service.list_topics().await.unwrap().is_empty());
    assert!(service.get_topic_overview("energy").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_backend_selection() {
    let root = TempDir::new().unwrap();
    let with_picker = || {
        StorageEnvironment::in_memory()
            .with_picker(Arc::new(PresetDirectoryPicker::new(root.path())))
    };

    let auto = TopicService::from_environment(with_picker(), &config(BackendChoice::Auto)).unwrap();
    assert!(auto.is_file_system_api_supported());
    assert!(auto.adapter().as_folder_linker().is_some());

    let fallback =
        TopicService::from_environment(StorageEnvironment::in_memory(), &config(BackendChoice::Auto))
            .unwrap();
    assert!(fallback.adapter().as_exporter().is_some());

    let virtual_db =
        TopicService::from_environment(with_picker(), &config(BackendChoice::VirtualDb)).unwrap();
    assert!(virtual_db.adapter().as_exporter().is_none());
    assert!(virtual_db.adapter().as_folder_linker().is_none());

    let err = TopicService::from_environment(
        StorageEnvironment::in_memory(),
        &config(BackendChoice::Native),
    )
    .err()
    .unwrap();
    assert!(matches!(err, TopicVaultError::Initialization(_)));
}
