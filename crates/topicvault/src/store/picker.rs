//! Directory grants.
//!
//! The native adapter never decides on its own where to write: a
//! [`DirectoryPicker`] stands for the user gesture that grants a folder. A picker
//! that is dismissed reports [`TopicVaultError::UserCancelled`], which callers must
//! treat as "nothing happened" rather than as a failure.

use crate::error::{Result, TopicVaultError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickPurpose {
    /// The root every managed topic lives under.
    StorageRoot,
    /// An existing folder to link to the given topic.
    LinkTopic(String),
}

#[async_trait]
pub trait DirectoryPicker: Send + Sync {
    async fn pick_directory(&self, purpose: &PickPurpose) -> Result<PathBuf>;
}

/// Picker answering from preconfigured choices. Anything not preconfigured behaves
/// like a dismissed dialog.
#[derive(Default)]
pub struct PresetDirectoryPicker {
    root: Option<PathBuf>,
    links: Mutex<HashMap<String, PathBuf>>,
}

impl PresetDirectoryPicker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            links: Mutex::new(HashMap::new()),
        }
    }

    /// A picker the user always dismisses.
    pub fn cancelling() -> Self {
        Self::default()
    }

    /// Answer the next link request for `topic_id` with `folder`.
    pub fn with_link(self, topic_id: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        self.preset_link(topic_id, folder);
        self
    }

    pub fn preset_link(&self, topic_id: impl Into<String>, folder: impl Into<PathBuf>) {
        if let Ok(mut links) = self.links.lock() {
            links.insert(topic_id.into(), folder.into());
        }
    }
}

#[async_trait]
impl DirectoryPicker for PresetDirectoryPicker {
    async fn pick_directory(&self, purpose: &PickPurpose) -> Result<PathBuf> {
        let picked = match purpose {
            PickPurpose::StorageRoot => self.root.clone(),
            PickPurpose::LinkTopic(topic_id) => self
                .links
                .lock()
                .map_err(|_| TopicVaultError::Store("picker lock poisoned".to_string()))?
                .get(topic_id)
                .cloned(),
        };
        picked.ok_or(TopicVaultError::UserCancelled)
    }
}
