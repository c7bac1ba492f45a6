//! # topicvault Architecture
//!
//! topicvault stores **debate topic workspaces**: a folder per topic holding an
//! overview, the user's position, and subfolders for arguments, evidence, practice
//! notes and media. It is a library; UI code drives it through one facade.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Facade (service.rs)                                        │
//! │  - TopicService: topics, documents, search, export          │
//! │  - Single-flight init, current user id, data wipe           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/)                                     │
//! │  - StorageAdapter trait + capability traits                 │
//! │  - Native folders, virtual database, archive downloads      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Key/Value Layer (kv/)                                      │
//! │  - JSON tables on disk (JsonFileKv) or in memory (MemKv)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Beside the layers sit the pure parts: [`model`] (types, slugs, paths),
//! [`template`] (seed document rendering), [`scaffold`] (the new-topic plan and the
//! creation journal), [`export`] (tar.gz topic archives) and [`search`].
//!
//! ## Virtual Paths
//!
//! Everything above the adapters addresses files as `topics/{id}/relative/path.md`,
//! always together with a user id. The terminal segment of a file operation names the
//! file; whether a listed name is a file is asked through `file_exists`, never guessed
//! from its spelling. `.` and `..` segments are rejected. Each adapter maps these paths
//! onto its own substrate under `users/{user_id}/`; the facade never knows which one
//! it is talking to.
//!
//! ## Getting Started
//!
//! ```no_run
//! use topicvault::config::load_config;
//! use topicvault::init::initialize;
//! use topicvault::model::NewTopic;
//!
//! # async fn run() -> topicvault::error::Result<()> {
//! let config = load_config(None)?;
//! let service = initialize(&config)?;
//! let topic = service
//!     .create_topic_from_browser_topic(&NewTopic::new("Universal Basic Income"))
//!     .await?;
//! let overview = service.get_topic_overview(&topic.id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing Strategy
//!
//! 1. Pure modules (`model`, `template`, `scaffold`, `export`, `search`) carry inline
//!    unit tests.
//! 2. Each adapter has an integration test file under `tests/` exercising the full
//!    contract against real temp directories or in-memory stores.
//! 3. `tests/service_test.rs` covers the facade end to end.

pub mod config;
pub mod error;
pub mod export;
pub mod init;
pub mod kv;
pub mod logging;
pub mod model;
pub mod scaffold;
pub mod search;
pub mod service;
pub mod store;
pub mod template;
