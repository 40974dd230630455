//! SQLite-based membership index.

use crate::error::{IndexError, IndexResult};
use crate::migrations::{
    REQUIRED_INDEXES, REQUIRED_TABLES, migrations, schema_migrations_ddl,
};
use crate::query::Dialect;
use crate::repos::MembershipIndex;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-based membership index.
///
/// Uses a single pooled connection: SQLite permits limited write concurrency
/// and a single connection avoids persistent "database is locked" failures
/// under concurrent callers.
pub struct SqliteIndex {
    pool: Pool<Sqlite>,
}

impl SqliteIndex {
    /// Open (or create) a file-backed index and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::Config(e.to_string()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        Self::connect(opts).await
    }

    /// Open an in-memory index, for tests.
    pub async fn in_memory() -> IndexResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(opts).await
    }

    async fn connect(opts: SqliteConnectOptions) -> IndexResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let index = Self { pool };
        index.migrate().await?;
        Ok(index)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MembershipIndex for SqliteIndex {
    async fn migrate(&self) -> IndexResult<()> {
        sqlx::query(schema_migrations_ddl(Dialect::Sqlite))
            .execute(&self.pool)
            .await?;

        let current: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        for migration in migrations(Dialect::Sqlite) {
            if migration.version <= current {
                continue;
            }
            let mut tx = self.pool.begin().await?;
            for statement in migration.statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query(
                "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?, ?, ?)",
            )
            .bind(migration.version)
            .bind(migration.description)
            .bind(crate::models::format_timestamp(time::OffsetDateTime::now_utc())?)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applied index migration"
            );
        }

        // Validate the schema actually materialized.
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&self.pool)
                .await?;
        let tables: HashSet<&str> = tables.iter().map(String::as_str).collect();
        for required in REQUIRED_TABLES {
            if !tables.contains(required) {
                return Err(IndexError::SchemaValidation(format!(
                    "missing table: {required}"
                )));
            }
        }

        let indexes: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'index'")
                .fetch_all(&self.pool)
                .await?;
        let indexes: HashSet<&str> = indexes.iter().map(String::as_str).collect();
        for required in REQUIRED_INDEXES {
            if !indexes.contains(required) {
                return Err(IndexError::SchemaValidation(format!(
                    "missing index: {required}"
                )));
            }
        }

        Ok(())
    }

    async fn health_check(&self) -> IndexResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Repository trait implementations for SqliteIndex.
mod sqlite_impl {
    use super::*;
    use crate::models::{
        ContainerRow, ContainerStats, MemberFilter, MemberSort, MembershipRow, format_timestamp,
        parse_timestamp,
    };
    use crate::query::{member_count_query, member_query};
    use crate::repos::{ContainerRecordRepo, MembershipRepo};
    use sqlx::Row;
    use sqlx::sqlite::SqliteRow;
    use strata_core::{ContainerType, MemberType, Pagination};
    use time::OffsetDateTime;

    fn membership_from_row(row: &SqliteRow) -> IndexResult<MembershipRow> {
        let member_type: String = row.try_get("member_type")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(MembershipRow {
            container_id: row.try_get("container_id")?,
            member_id: row.try_get("member_id")?,
            member_type: MemberType::parse(&member_type)
                .map_err(|e| IndexError::Internal(e.to_string()))?,
            created_at: parse_timestamp(&created_at),
        })
    }

    fn container_from_row(row: &SqliteRow) -> IndexResult<ContainerRow> {
        let container_type: String = row.try_get("container_type")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(ContainerRow {
            id: row.try_get("id")?,
            parent_id: row.try_get("parent_id")?,
            container_type: ContainerType::parse(&container_type)
                .map_err(|e| IndexError::Internal(e.to_string()))?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    #[async_trait]
    impl ContainerRecordRepo for SqliteIndex {
        async fn upsert_container(&self, row: &ContainerRow) -> IndexResult<()> {
            sqlx::query(Dialect::Sqlite.upsert_container())
                .bind(&row.id)
                .bind(&row.parent_id)
                .bind(row.container_type.as_str())
                .bind(&row.title)
                .bind(&row.description)
                .bind(format_timestamp(row.created_at)?)
                .bind(format_timestamp(row.updated_at)?)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn get_container_record(&self, id: &str) -> IndexResult<Option<ContainerRow>> {
            let row = sqlx::query("SELECT * FROM containers WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(container_from_row).transpose()
        }

        async fn delete_container_record(&self, id: &str) -> IndexResult<()> {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query("DELETE FROM containers WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(IndexError::NotFound(format!("container {id} not found")));
            }
            sqlx::query("DELETE FROM memberships WHERE container_id = ? OR member_id = ?")
                .bind(id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        }

        async fn container_exists(&self, id: &str) -> IndexResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM containers WHERE id = ?)")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn get_children(&self, parent_id: &str) -> IndexResult<Vec<ContainerRow>> {
            let rows = sqlx::query(
                "SELECT * FROM containers WHERE parent_id = ? ORDER BY created_at ASC, id ASC",
            )
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(container_from_row).collect()
        }
    }

    #[async_trait]
    impl MembershipRepo for SqliteIndex {
        async fn index_membership(
            &self,
            container_id: &str,
            member_id: &str,
        ) -> IndexResult<MemberType> {
            let member_type = if self.container_exists(member_id).await? {
                MemberType::Container
            } else {
                MemberType::Resource
            };

            sqlx::query(Dialect::Sqlite.upsert_membership())
                .bind(container_id)
                .bind(member_id)
                .bind(member_type.as_str())
                .bind(format_timestamp(OffsetDateTime::now_utc())?)
                .execute(&self.pool)
                .await?;
            Ok(member_type)
        }

        async fn remove_membership(&self, container_id: &str, member_id: &str) -> IndexResult<()> {
            let result =
                sqlx::query("DELETE FROM memberships WHERE container_id = ? AND member_id = ?")
                    .bind(container_id)
                    .bind(member_id)
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(IndexError::NotFound(format!(
                    "membership ({container_id}, {member_id}) not found"
                )));
            }
            Ok(())
        }

        async fn get_members(
            &self,
            container_id: &str,
            page: &Pagination,
        ) -> IndexResult<Vec<MembershipRow>> {
            self.get_members_filtered(
                container_id,
                page,
                &MemberFilter::default(),
                &MemberSort::default(),
            )
            .await
        }

        async fn get_members_filtered(
            &self,
            container_id: &str,
            page: &Pagination,
            filter: &MemberFilter,
            sort: &MemberSort,
        ) -> IndexResult<Vec<MembershipRow>> {
            let built = member_query(Dialect::Sqlite, container_id, filter, sort, page);
            let mut query = sqlx::query(&built.sql);
            for bind in &built.binds {
                query = query.bind(bind);
            }
            let rows = query.fetch_all(&self.pool).await?;
            rows.iter().map(membership_from_row).collect()
        }

        async fn get_containers(&self, member_id: &str) -> IndexResult<Vec<MembershipRow>> {
            let rows = sqlx::query(
                "SELECT container_id, member_id, member_type, created_at FROM memberships \
                 WHERE member_id = ? ORDER BY created_at ASC, container_id ASC",
            )
            .bind(member_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(membership_from_row).collect()
        }

        async fn get_member_count(&self, container_id: &str) -> IndexResult<u64> {
            self.get_filtered_member_count(container_id, &MemberFilter::default())
                .await
        }

        async fn get_filtered_member_count(
            &self,
            container_id: &str,
            filter: &MemberFilter,
        ) -> IndexResult<u64> {
            let built = member_count_query(Dialect::Sqlite, container_id, filter);
            let mut query = sqlx::query_scalar::<_, i64>(&built.sql);
            for bind in &built.binds {
                query = query.bind(bind);
            }
            let count = query.fetch_one(&self.pool).await?;
            Ok(count as u64)
        }

        async fn get_container_stats(&self, container_id: &str) -> IndexResult<ContainerStats> {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT member_type, COUNT(*) FROM memberships WHERE container_id = ? \
                 GROUP BY member_type",
            )
            .bind(container_id)
            .fetch_all(&self.pool)
            .await?;

            let mut stats = ContainerStats::default();
            for (member_type, count) in rows {
                let count = count as u64;
                stats.member_count += count;
                match MemberType::parse(&member_type) {
                    Ok(MemberType::Container) => stats.container_count += count,
                    Ok(MemberType::Resource) => stats.resource_count += count,
                    Err(e) => return Err(IndexError::Internal(e.to_string())),
                }
            }
            Ok(stats)
        }

        async fn rebuild_index(&self) -> IndexResult<()> {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM memberships").execute(&mut *tx).await?;
            tx.commit().await?;
            tracing::info!("membership index cleared for rebuild");
            Ok(())
        }
    }
}
