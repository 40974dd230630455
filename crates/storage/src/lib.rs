//! Checksummed filesystem resource storage for strata.
//!
//! This crate provides:
//! - Per-resource directories holding content and a metadata record
//! - SHA-256 verification on every full read
//! - Streaming store/retrieve with progressive hashing
//! - Deterministic ID sanitization against path traversal

pub mod checksum;
pub mod error;
pub mod traits;

pub use checksum::{ChecksumStore, sanitize_id};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ResourceMeta, ResourceStore};

use std::sync::Arc;
use strata_core::config::StorageConfig;

/// Create a resource store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<ChecksumStore>> {
    let store = ChecksumStore::new(config.resources_dir()).await?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use strata_core::Resource;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_creates_store() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::new(temp.path());

        let store = from_config(&config).await.unwrap();
        store
            .store(&Resource::new("r1", "text/plain", Bytes::from_static(b"hi")))
            .await
            .unwrap();
        assert!(store.exists("r1").await.unwrap());
    }
}
