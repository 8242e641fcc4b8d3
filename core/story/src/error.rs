use bookwright_schemas::EntityKind;
use thiserror::Error;

/// Errors surfaced by the story store and session.
///
/// A lookup that finds nothing is not an error; it is `None`.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("{0}")]
    Validation(String),

    #[error("{} not found: {}", .kind.label(), .key)]
    UnknownRecord { kind: EntityKind, key: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoryError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoryError::Validation(message.into())
    }

    pub fn unknown(kind: EntityKind, key: impl Into<String>) -> Self {
        StoryError::UnknownRecord {
            kind,
            key: key.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoryError>;
