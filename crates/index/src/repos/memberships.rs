//! Membership edge repository.

use crate::error::IndexResult;
use crate::models::{ContainerStats, MemberFilter, MemberSort, MembershipRow};
use async_trait::async_trait;
use strata_core::{MemberType, Pagination};

/// Repository for containment edges.
#[async_trait]
pub trait MembershipRepo: Send + Sync {
    /// Record that `member_id` belongs to `container_id`.
    ///
    /// The member type is derived by probing whether `member_id` exists as a
    /// container. The insert is an idempotent upsert: indexing an existing
    /// edge succeeds. Returns the derived member type.
    async fn index_membership(&self, container_id: &str, member_id: &str)
        -> IndexResult<MemberType>;

    /// Remove an edge.
    ///
    /// Fails with `NotFound` when no matching edge exists. This asymmetry
    /// with the idempotent `index_membership` is intentional: callers rely on
    /// the failure signal to catch double-removal bugs.
    async fn remove_membership(&self, container_id: &str, member_id: &str) -> IndexResult<()>;

    /// List a container's edges ordered by insertion time ascending.
    /// A `limit` of zero returns all remaining rows from `offset`.
    async fn get_members(
        &self,
        container_id: &str,
        page: &Pagination,
    ) -> IndexResult<Vec<MembershipRow>>;

    /// List with filtering and sorting; both apply before pagination.
    async fn get_members_filtered(
        &self,
        container_id: &str,
        page: &Pagination,
        filter: &MemberFilter,
        sort: &MemberSort,
    ) -> IndexResult<Vec<MembershipRow>>;

    /// Reverse lookup: every container currently containing `member_id`,
    /// ordered by edge creation time.
    async fn get_containers(&self, member_id: &str) -> IndexResult<Vec<MembershipRow>>;

    /// Total number of edges for a container.
    async fn get_member_count(&self, container_id: &str) -> IndexResult<u64>;

    /// Edge count over the same predicate space as `get_members_filtered`.
    async fn get_filtered_member_count(
        &self,
        container_id: &str,
        filter: &MemberFilter,
    ) -> IndexResult<u64>;

    /// Aggregate member statistics for one container.
    async fn get_container_stats(&self, container_id: &str) -> IndexResult<ContainerStats>;

    /// Clear all membership rows inside one transaction.
    ///
    /// Destructive and deliberately one-sided: repopulation is the caller's
    /// responsibility (a rescan of the authoritative filesystem store).
    async fn rebuild_index(&self) -> IndexResult<()>;
}
