//! Resource store trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;
use strata_core::Resource;
use time::OffsetDateTime;

/// A boxed stream of bytes for streaming reads and writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Persisted per-resource metadata record (`metadata.json`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub id: String,
    pub content_type: String,
    /// Serialization format the content arrived in, if the caller recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_format: Option<String>,
    pub size: u64,
    /// SHA-256 hex digest of the content file.
    pub checksum: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Checksummed resource store abstraction.
///
/// The filesystem is the single source of truth; every full read re-verifies
/// the stored digest and refuses to return corrupted bytes.
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    /// Store a resource, overwriting any previous content under the same ID.
    /// Last write wins; there is no existence check.
    async fn store(&self, resource: &Resource) -> StorageResult<ResourceMeta>;

    /// Retrieve a resource, verifying its checksum.
    async fn retrieve(&self, id: &str) -> StorageResult<Resource>;

    /// Read a resource's metadata record without touching the content file.
    async fn retrieve_meta(&self, id: &str) -> StorageResult<ResourceMeta>;

    /// Delete a resource and all of its on-disk artifacts.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Pure existence probe; reads no content.
    async fn exists(&self, id: &str) -> StorageResult<bool>;

    /// Store a resource from a byte stream, computing the checksum as bytes
    /// flow through. Memory use is bounded by the stream's chunk size.
    async fn store_stream(
        &self,
        id: &str,
        content_type: &str,
        stream: ByteStream,
    ) -> StorageResult<ResourceMeta>;

    /// Retrieve a resource as a byte stream.
    ///
    /// The digest is recomputed progressively as the caller drains the
    /// stream, so a mismatch is only reported after the final chunk. A caller
    /// that reads a prefix and stops never learns the content was corrupt.
    async fn retrieve_stream(&self, id: &str) -> StorageResult<(ResourceMeta, ByteStream)>;
}
