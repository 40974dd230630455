//! PostgreSQL-based membership index.

use crate::error::{IndexError, IndexResult};
use crate::migrations::{
    REQUIRED_INDEXES, REQUIRED_TABLES, migrations, schema_migrations_ddl,
};
use crate::query::Dialect;
use crate::repos::MembershipIndex;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::collections::HashSet;
use std::str::FromStr;

/// PostgreSQL-based membership index.
pub struct PostgresIndex {
    pool: Pool<Postgres>,
}

impl PostgresIndex {
    /// Connect from a URL and run migrations.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> IndexResult<Self> {
        let mut opts = PgConnectOptions::from_str(url)?;
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", timeout_ms.to_string())]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await?;

        let index = Self { pool };
        index.migrate().await?;
        Ok(index)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MembershipIndex for PostgresIndex {
    async fn migrate(&self) -> IndexResult<()> {
        sqlx::query(schema_migrations_ddl(Dialect::Postgres))
            .execute(&self.pool)
            .await?;

        let current: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        for migration in migrations(Dialect::Postgres) {
            if migration.version <= current {
                continue;
            }
            let mut tx = self.pool.begin().await?;
            for statement in migration.statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query(
                "INSERT INTO schema_migrations (version, description, applied_at) VALUES ($1, $2, $3)",
            )
            .bind(migration.version)
            .bind(migration.description)
            .bind(time::OffsetDateTime::now_utc())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applied index migration"
            );
        }

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = current_schema()",
        )
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

        let indexes: Vec<String> = sqlx::query_scalar(
            "SELECT indexname FROM pg_indexes WHERE schemaname = current_schema()",
        )
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

// Repository trait implementations for PostgresIndex.
mod postgres_impl {
    use super::*;
    use crate::models::{ContainerRow, ContainerStats, MemberFilter, MemberSort, MembershipRow};
    use crate::query::{member_count_query, member_query};
    use crate::repos::{ContainerRecordRepo, MembershipRepo};
    use sqlx::Row;
    use sqlx::postgres::PgRow;
    use strata_core::{ContainerType, MemberType, Pagination};
    use time::OffsetDateTime;

    fn membership_from_row(row: &PgRow) -> IndexResult<MembershipRow> {
        let member_type: String = row.try_get("member_type")?;
        Ok(MembershipRow {
            container_id: row.try_get("container_id")?,
            member_id: row.try_get("member_id")?,
            member_type: MemberType::parse(&member_type)
                .map_err(|e| IndexError::Internal(e.to_string()))?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn container_from_row(row: &PgRow) -> IndexResult<ContainerRow> {
        let container_type: String = row.try_get("container_type")?;
        Ok(ContainerRow {
            id: row.try_get("id")?,
            parent_id: row.try_get("parent_id")?,
            container_type: ContainerType::parse(&container_type)
                .map_err(|e| IndexError::Internal(e.to_string()))?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    #[async_trait]
    impl ContainerRecordRepo for PostgresIndex {
        async fn upsert_container(&self, row: &ContainerRow) -> IndexResult<()> {
            sqlx::query(Dialect::Postgres.upsert_container())
                .bind(&row.id)
                .bind(&row.parent_id)
                .bind(row.container_type.as_str())
                .bind(&row.title)
                .bind(&row.description)
                .bind(row.created_at)
                .bind(row.updated_at)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn get_container_record(&self, id: &str) -> IndexResult<Option<ContainerRow>> {
            let row = sqlx::query("SELECT * FROM containers WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(container_from_row).transpose()
        }

        async fn delete_container_record(&self, id: &str) -> IndexResult<()> {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query("DELETE FROM containers WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(IndexError::NotFound(format!("container {id} not found")));
            }
            sqlx::query("DELETE FROM memberships WHERE container_id = $1 OR member_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        }

        async fn container_exists(&self, id: &str) -> IndexResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM containers WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn get_children(&self, parent_id: &str) -> IndexResult<Vec<ContainerRow>> {
            let rows = sqlx::query(
                "SELECT * FROM containers WHERE parent_id = $1 ORDER BY created_at ASC, id ASC",
            )
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(container_from_row).collect()
        }
    }

    #[async_trait]
    impl MembershipRepo for PostgresIndex {
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

            sqlx::query(Dialect::Postgres.upsert_membership())
                .bind(container_id)
                .bind(member_id)
                .bind(member_type.as_str())
                .bind(OffsetDateTime::now_utc())
                .execute(&self.pool)
                .await?;
            Ok(member_type)
        }

        async fn remove_membership(&self, container_id: &str, member_id: &str) -> IndexResult<()> {
            let result =
                sqlx::query("DELETE FROM memberships WHERE container_id = $1 AND member_id = $2")
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
            let built = member_query(Dialect::Postgres, container_id, filter, sort, page);
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
                 WHERE member_id = $1 ORDER BY created_at ASC, container_id ASC",
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
            let built = member_count_query(Dialect::Postgres, container_id, filter);
            let mut query = sqlx::query_scalar::<_, i64>(&built.sql);
            for bind in &built.binds {
                query = query.bind(bind);
            }
            let count = query.fetch_one(&self.pool).await?;
            Ok(count as u64)
        }

        async fn get_container_stats(&self, container_id: &str) -> IndexResult<ContainerStats> {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT member_type, COUNT(*) FROM memberships WHERE container_id = $1 \
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
