//! # Topic Scaffold
//!
//! Every backend seeds a new topic with the same tree. [`TopicScaffold`] is that
//! plan, fully rendered up front so adapters only perform I/O:
//!
//! 1. the topic directory and its four fixed subdirectories,
//! 2. six seed files (`overview.md`, `my-position.md`, one `README.md` per subdirectory),
//! 3. the hidden metadata file, always written **last**.
//!
//! ## Staged Creation
//!
//! Creation is a multi-step sequence with no transaction underneath. Adapters record
//! every artifact they bring into existence in a [`CreationJournal`]; when a later
//! step fails they undo the journal newest-first. Artifacts that already existed
//! before the attempt (a slug collision overwriting an older topic) are not journaled
//! as created and survive the rollback.

use crate::error::Result;
use crate::model::{self, TopicMetadata, OVERVIEW_FILE, POSITION_FILE, README_FILE};
use crate::template::{self, TemplateVars};
use crate::template_vars;

/// Fixed subdirectories and the README each one is seeded with.
pub const SUBDIRECTORIES: [(&str, &str); 4] = [
    (
        "arguments",
        "# Arguments\n\nStore your structured debate arguments here.\n",
    ),
    (
        "evidence",
        "# Evidence\n\nCollect research, studies, quotes, and supporting evidence here.\n",
    ),
    (
        "practice",
        "# Practice Notes\n\nTrack your practice sessions and feedback here.\n",
    ),
    (
        "media",
        "# Media\n\nStore diagrams, charts, and visual aids here.\n",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedFile {
    /// Relative to the topic root, e.g. `arguments/README.md`.
    pub relative_path: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct TopicScaffold {
    topic: TopicMetadata,
    files: Vec<SeedFile>,
    metadata_file: SeedFile,
}

impl TopicScaffold {
    pub fn new(topic: &TopicMetadata, app_name: &str) -> Result<Self> {
        let vars = template_vars_for(topic);

        let mut files = vec![
            SeedFile {
                relative_path: OVERVIEW_FILE.to_string(),
                content: template::OVERVIEW.render(&vars),
            },
            SeedFile {
                relative_path: POSITION_FILE.to_string(),
                content: template::POSITION.render(&vars),
            },
        ];
        for (dir, readme) in SUBDIRECTORIES {
            files.push(SeedFile {
                relative_path: format!("{}/{}", dir, README_FILE),
                content: readme.to_string(),
            });
        }

        let metadata_file = SeedFile {
            relative_path: model::metadata_file_name(app_name),
            content: serde_json::to_string_pretty(topic)?,
        };

        Ok(Self {
            topic: topic.clone(),
            files,
            metadata_file,
        })
    }

    pub fn topic(&self) -> &TopicMetadata {
        &self.topic
    }

    /// `topics/{id}`
    pub fn root(&self) -> String {
        self.topic.root_path()
    }

    /// Subdirectory names relative to the topic root.
    pub fn directories(&self) -> impl Iterator<Item = &'static str> {
        SUBDIRECTORIES.iter().map(|(dir, _)| *dir)
    }

    /// The six visible seed files. The metadata file is not included.
    pub fn seed_files(&self) -> &[SeedFile] {
        &self.files
    }

    pub fn metadata_file(&self) -> &SeedFile {
        &self.metadata_file
    }

    /// Full virtual path of a file relative to this topic.
    pub fn path_of(&self, relative: &str) -> String {
        model::topic_file_path(&self.topic.id, relative)
    }
}

/// Variables available to the overview and position templates.
pub fn template_vars_for(topic: &TopicMetadata) -> TemplateVars {
    template_vars! {
        "id" => topic.id.as_str(),
        "title" => topic.title.as_str(),
        "category" => topic.category.as_str(),
        "complexity_level" => topic.complexity_level,
        "description" => topic.description.as_str(),
        "created_at" => topic.created_at.to_rfc3339(),
        "last_modified" => topic.last_modified.to_rfc3339(),
        "position" => topic.position.as_str(),
        "conviction" => topic.conviction,
    }
}

/// Parses the contents of a hidden metadata file.
pub fn parse_metadata(content: &str) -> Result<TopicMetadata> {
    Ok(serde_json::from_str(content)?)
}

/// Something a creation attempt brought into existence.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Directory(String),
    File(String),
    /// A database record. `previous` is the value it replaced, restored on rollback.
    Record {
        table: String,
        key: String,
        previous: Option<serde_json::Value>,
    },
}

#[derive(Debug, Default)]
pub struct CreationJournal {
    artifacts: Vec<Artifact>,
}

impl CreationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_directory(&mut self, path: impl Into<String>) {
        self.artifacts.push(Artifact::Directory(path.into()));
    }

    pub fn created_file(&mut self, path: impl Into<String>) {
        self.artifacts.push(Artifact::File(path.into()));
    }

    pub fn wrote_record(
        &mut self,
        table: impl Into<String>,
        key: impl Into<String>,
        previous: Option<serde_json::Value>,
    ) {
        self.artifacts.push(Artifact::Record {
            table: table.into(),
            key: key.into(),
            previous,
        });
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Drains the journal in undo order.
    pub fn into_undo_order(self) -> impl Iterator<Item = Artifact> {
        self.artifacts.into_iter().rev()
    }
}
