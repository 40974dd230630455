//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid member type: {0}")]
    InvalidMemberType(String),

    #[error("invalid container type: {0}")]
    InvalidContainerType(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
