//! # Domain Model
//!
//! A **topic** is a workspace the user prepares a debate in. It is identified by a
//! slug derived from its title and owns a small, fixed file tree:
//!
//! ```text
//! topics/{id}/
//! ├── .{app}-meta.json   # TopicMetadata (hidden, never exported)
//! ├── overview.md
//! ├── my-position.md
//! ├── arguments/README.md
//! ├── evidence/README.md
//! ├── practice/README.md
//! └── media/README.md
//! ```
//!
//! Paths in this crate are *virtual*: `/`-delimited strings rooted at `topics/`.
//! Each adapter maps them onto its own substrate, inside a partition for the user
//! the call is made for (`users/{user_id}/topics/...`, see [`user_scoped_path`]).
//!
//! ## Slugs
//!
//! [`slugify`] lowercases, collapses every run of characters outside `[a-z0-9]` into
//! one `-`, and trims hyphens at both ends. It is idempotent. Two titles that slugify
//! identically name the same topic; creating the second overwrites the first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TopicVaultError};

pub const TOPICS_ROOT: &str = "topics";
pub const USERS_ROOT: &str = "users";
pub const OVERVIEW_FILE: &str = "overview.md";
pub const POSITION_FILE: &str = "my-position.md";
pub const README_FILE: &str = "README.md";

pub const DEFAULT_CATEGORY: &str = "General";
pub const DEFAULT_COMPLEXITY: u8 = 5;
pub const DEFAULT_CONVICTION: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Pro,
    Con,
    #[default]
    Neutral,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Pro => "pro",
            Position::Con => "con",
            Position::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub id: String,
    pub title: String,
    pub category: String,
    pub complexity_level: u8,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_conviction")]
    pub conviction: u8,
}

fn default_conviction() -> u8 {
    DEFAULT_CONVICTION
}

impl TopicMetadata {
    /// Builds the metadata for a brand new topic, stamped `now`.
    pub fn from_new_topic(new_topic: &NewTopic, now: DateTime<Utc>) -> Result<Self> {
        let id = slugify(&new_topic.title);
        if id.is_empty() {
            return Err(TopicVaultError::Validation(format!(
                "title {:?} has no usable characters for an id",
                new_topic.title
            )));
        }
        let complexity_level = new_topic.complexity_level.unwrap_or(DEFAULT_COMPLEXITY);
        check_scale("complexity_level", complexity_level, 10)?;

        Ok(Self {
            id,
            title: new_topic.title.clone(),
            category: new_topic
                .category
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            complexity_level,
            description: new_topic.description.clone().unwrap_or_default(),
            created_at: now,
            last_modified: now,
            position: Position::Neutral,
            conviction: DEFAULT_CONVICTION,
        })
    }

    /// Root of this topic's file tree, e.g. `topics/climate-change`.
    pub fn root_path(&self) -> String {
        topic_root(&self.id)
    }
}

/// Raw topic as submitted by a UI form. Only the title is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub title: String,
    pub category: Option<String>,
    pub complexity_level: Option<u8>,
    pub description: Option<String>,
}

impl NewTopic {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_complexity(mut self, level: u8) -> Self {
        self.complexity_level = Some(level);
        self
    }
}

/// Partial update. `None` fields are left untouched; `id` and `created_at` never change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicUpdate {
    pub title: Option<String>,
    pub category: Option<String>,
    pub complexity_level: Option<u8>,
    pub description: Option<String>,
    pub position: Option<Position>,
    pub conviction: Option<u8>,
}

impl TopicUpdate {
    /// Returns the updated copy with `last_modified` set to `now`.
    pub fn apply(&self, topic: &TopicMetadata, now: DateTime<Utc>) -> Result<TopicMetadata> {
        let mut updated = topic.clone();
        if let Some(title) = &self.title {
            updated.title = title.clone();
        }
        if let Some(category) = &self.category {
            updated.category = category.clone();
        }
        if let Some(level) = self.complexity_level {
            check_scale("complexity_level", level, 10)?;
            updated.complexity_level = level;
        }
        if let Some(description) = &self.description {
            updated.description = description.clone();
        }
        if let Some(position) = self.position {
            updated.position = position;
        }
        if let Some(conviction) = self.conviction {
            check_scale("conviction", conviction, 10)?;
            updated.conviction = conviction;
        }
        updated.last_modified = now;
        Ok(updated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentKind {
    #[default]
    Main,
    Supporting,
    Counter,
    Rebuttal,
}

impl ArgumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgumentKind::Main => "main",
            ArgumentKind::Supporting => "supporting",
            ArgumentKind::Counter => "counter",
            ArgumentKind::Rebuttal => "rebuttal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDraft {
    pub title: String,
    pub content: String,
    pub kind: ArgumentKind,
    /// 1-5
    pub strength: u8,
    pub evidence_ids: Vec<String>,
}

impl ArgumentDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            kind: ArgumentKind::Main,
            strength: 3,
            evidence_ids: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: ArgumentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_strength(mut self, strength: u8) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_evidence(mut self, evidence_id: impl Into<String>) -> Self {
        self.evidence_ids.push(evidence_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Statistic,
    #[default]
    Study,
    Quote,
    Example,
    ExpertOpinion,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Statistic => "statistic",
            EvidenceKind::Study => "study",
            EvidenceKind::Quote => "quote",
            EvidenceKind::Example => "example",
            EvidenceKind::ExpertOpinion => "expert_opinion",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceDraft {
    pub title: String,
    pub content: String,
    pub kind: EvidenceKind,
    pub source: String,
    pub source_url: Option<String>,
    /// 1-5
    pub credibility: u8,
}

impl EvidenceDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            kind: EvidenceKind::Study,
            source: String::new(),
            source_url: None,
            credibility: 3,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_kind(mut self, kind: EvidenceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_credibility(mut self, credibility: u8) -> Self {
        self.credibility = credibility;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeNote {
    pub performance_notes: String,
    /// 1-5
    pub rating: u8,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub ai_feedback: Option<String>,
}

impl PracticeNote {
    pub fn new(performance_notes: impl Into<String>) -> Self {
        Self {
            performance_notes: performance_notes.into(),
            rating: 3,
            strengths: Vec::new(),
            areas_for_improvement: Vec::new(),
            ai_feedback: None,
        }
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = rating;
        self
    }
}

/// Lowercase, non-alphanumeric runs collapsed to `-`, no leading or trailing `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

pub fn topic_root(topic_id: &str) -> String {
    format!("{}/{}", TOPICS_ROOT, topic_id)
}

pub fn topic_file_path(topic_id: &str, relative: &str) -> String {
    format!("{}/{}/{}", TOPICS_ROOT, topic_id, relative)
}

/// Name of the hidden per-topic metadata file, e.g. `.topicvault-meta.json`.
pub fn metadata_file_name(app_name: &str) -> String {
    format!(".{}-meta.json", app_name)
}

/// Splits `topics/{id}/rest` into `(id, rest)`. `rest` may be empty.
pub fn split_topic_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.trim_start_matches('/').strip_prefix(TOPICS_ROOT)?;
    let rest = rest.strip_prefix('/')?;
    let (id, tail) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };
    if id.is_empty() {
        None
    } else {
        Some((id, tail))
    }
}

/// Splits a virtual path into its non-empty segments, rejecting `.` and `..`.
pub fn path_segments(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(TopicVaultError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Joins the segments of `path` with single slashes. The empty path is rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    let segments = path_segments(path)?;
    if segments.is_empty() {
        return Err(TopicVaultError::InvalidPath(path.to_string()));
    }
    Ok(segments.join("/"))
}

/// A user id must be one visible path segment.
pub fn check_user_id(user_id: &str) -> Result<&str> {
    match path_segments(user_id)?.as_slice() {
        [user] if !is_hidden(user) && *user == user_id => Ok(*user),
        _ => Err(TopicVaultError::InvalidPath(format!("invalid user id {:?}", user_id))),
    }
}

/// `users/{user_id}/{path}` with `path` normalized. Key under which user-partitioned
/// stores keep a virtual path.
pub fn user_scoped_path(user_id: &str, path: &str) -> Result<String> {
    let user = check_user_id(user_id)?;
    Ok(format!("{}/{}/{}", USERS_ROOT, user, normalize_path(path)?))
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

pub(crate) fn check_scale(field: &str, value: u8, max: u8) -> Result<()> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(TopicVaultError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            field, max, value
        )))
    }
}
