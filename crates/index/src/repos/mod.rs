//! Repository traits for the membership index.

pub mod containers;
pub mod memberships;

pub use containers::ContainerRecordRepo;
pub use memberships::MembershipRepo;

use crate::error::IndexResult;
use async_trait::async_trait;

/// Combined membership index trait.
#[async_trait]
pub trait MembershipIndex: ContainerRecordRepo + MembershipRepo + Send + Sync {
    /// Apply pending schema migrations and validate the result.
    async fn migrate(&self) -> IndexResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> IndexResult<()>;
}
