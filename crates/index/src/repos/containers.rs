//! Container record repository.

use crate::error::IndexResult;
use crate::models::ContainerRow;
use async_trait::async_trait;

/// Repository for rows in the `containers` table.
///
/// These records mirror the authoritative container documents on the
/// filesystem; they exist so member typing and child lookups never have to
/// scan disk.
#[async_trait]
pub trait ContainerRecordRepo: Send + Sync {
    /// Create or update a container record.
    async fn upsert_container(&self, row: &ContainerRow) -> IndexResult<()>;

    /// Get a container record by ID.
    async fn get_container_record(&self, id: &str) -> IndexResult<Option<ContainerRow>>;

    /// Delete a container record and every edge that references it, in one
    /// transaction. Fails with `NotFound` if no record exists.
    async fn delete_container_record(&self, id: &str) -> IndexResult<()>;

    /// Check whether a container record exists.
    async fn container_exists(&self, id: &str) -> IndexResult<bool>;

    /// Direct children: containers whose `parent_id` equals the given ID,
    /// ordered by creation time.
    async fn get_children(&self, parent_id: &str) -> IndexResult<Vec<ContainerRow>>;
}
