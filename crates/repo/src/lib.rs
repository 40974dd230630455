//! Container repository and secondary indexing for strata.
//!
//! This crate composes the lower layers into the public storage surface:
//! - Hierarchical containers persisted as checksummed resources plus JSON
//!   sidecar documents, with membership edges mirrored into the relational
//!   index
//! - An in-memory secondary index over resource metadata with a persistent
//!   snapshot
//! - Cache-aside wrappers for both the resource store and the repository

pub mod cached;
pub mod container;
pub mod documents;
pub mod error;
pub mod secondary;

pub use cached::{CachedContainerRepository, CachedResourceStore};
pub use container::{ContainerRepository, FsContainerRepository};
pub use documents::{ContainerDoc, ContainerDocStore};
pub use error::{RepoError, RepoResult};
pub use secondary::{IndexEntry, SecondaryIndex, SecondaryIndexStats};

use std::sync::Arc;
use strata_core::config::StorageConfig;
use strata_index::MembershipIndex;

/// Create a container repository from configuration.
pub async fn from_config(
    config: &StorageConfig,
    index: Arc<dyn MembershipIndex>,
) -> RepoResult<FsContainerRepository> {
    FsContainerRepository::new(config.containers_dir(), index).await
}
