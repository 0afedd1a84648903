//! Application-wide error types.

use thiserror::Error;

use crate::media::DecodeError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn recognition(msg: impl Into<String>) -> Self {
        Self::Recognition(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = Error::not_found("Video", 42);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Entity not found: Video with id 42");
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: Error = DecodeError::Truncated {
            frame_index: 7,
            expected: 12,
            received: 5,
        }
        .into();
        assert!(matches!(err, Error::Decode(_)));
    }
}
