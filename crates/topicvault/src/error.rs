use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopicVaultError {
    /// Storage could not be opened (permission denied, unusable location, missing capability).
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// The user dismissed the directory picker. Not a failure; callers should not alert.
    #[error("Directory selection cancelled")]
    UserCancelled,

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not supported by this storage backend: {0}")]
    Unsupported(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl TopicVaultError {
    /// True for missing topics and missing files. Callers usually fall back to a default.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TopicVaultError::TopicNotFound(_) | TopicVaultError::FileNotFound(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TopicVaultError::UserCancelled)
    }
}

pub type Result<T> = std::result::Result<T, TopicVaultError>;
