//! Repository error types.

use strata_index::IndexError;
use strata_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the container repository and secondary index.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    #[error("invalid ID: {0}")]
    InvalidId(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("container {0} is not empty")]
    ContainerNotEmpty(String),

    #[error("no membership of {member_id} in {container_id}")]
    MembershipNotFound {
        container_id: String,
        member_id: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;
