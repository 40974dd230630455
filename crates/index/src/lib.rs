//! Relational membership index for strata.
//!
//! This crate records containment edges and container records in a SQL
//! database, independent of the filesystem store:
//! - `containers` mirrors container records for typing and child lookups
//! - `memberships` holds the directed containment edges
//! - Two interchangeable backends (SQLite and PostgreSQL) behind one trait
//!
//! The index is a derived, rebuildable projection of the filesystem; it must
//! never be treated as authoritative without the ability to reconcile via
//! `rebuild_index` and a rescan.

pub mod error;
pub mod migrations;
pub mod models;
pub mod postgres;
pub mod query;
pub mod repos;
pub mod sqlite;

pub use error::{IndexError, IndexResult};
pub use models::{
    ContainerRow, ContainerStats, MemberFilter, MemberSort, MembershipRow, SortDirection,
    SortField,
};
pub use postgres::PostgresIndex;
pub use query::Dialect;
pub use repos::{ContainerRecordRepo, MembershipIndex, MembershipRepo};
pub use sqlite::SqliteIndex;

use std::sync::Arc;
use strata_core::config::IndexConfig;

/// Create a membership index from configuration.
pub async fn from_config(config: &IndexConfig) -> IndexResult<Arc<dyn MembershipIndex>> {
    match config {
        IndexConfig::Sqlite { path } => {
            let index = SqliteIndex::new(path).await?;
            Ok(Arc::new(index) as Arc<dyn MembershipIndex>)
        }
        IndexConfig::Postgres {
            url,
            max_connections,
            statement_timeout_ms,
        } => {
            tracing::info!("connecting to PostgreSQL membership index");
            let index = PostgresIndex::from_url(url, *max_connections, *statement_timeout_ms).await?;
            Ok(Arc::new(index) as Arc<dyn MembershipIndex>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp = tempfile::tempdir().unwrap();
        let config = IndexConfig::Sqlite {
            path: temp.path().join("index.db"),
        };

        let index = from_config(&config).await.unwrap();
        index.health_check().await.unwrap();
    }
}
