//! Membership index error types.

use thiserror::Error;

/// Membership index operation errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
