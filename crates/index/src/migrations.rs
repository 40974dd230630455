//! Versioned schema migrations.
//!
//! Versions are monotonically increasing integers recorded in the
//! `schema_migrations` table. Applying is idempotent: already-recorded
//! versions are skipped, each pending version runs inside one transaction,
//! and the result is validated by checking for required tables and indexes.

use crate::query::Dialect;

/// One schema migration step.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

/// Bootstrap DDL for the migration bookkeeping table itself.
pub fn schema_migrations_ddl(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => {
            "CREATE TABLE IF NOT EXISTS schema_migrations (\
             version INTEGER PRIMARY KEY, \
             description TEXT NOT NULL, \
             applied_at TEXT NOT NULL)"
        }
        Dialect::Postgres => {
            "CREATE TABLE IF NOT EXISTS schema_migrations (\
             version BIGINT PRIMARY KEY, \
             description TEXT NOT NULL, \
             applied_at TIMESTAMPTZ NOT NULL)"
        }
    }
}

const SQLITE_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create containers and memberships",
        statements: &[
            "CREATE TABLE IF NOT EXISTS containers (\
             id TEXT PRIMARY KEY, \
             parent_id TEXT REFERENCES containers(id), \
             container_type TEXT NOT NULL DEFAULT 'basic', \
             title TEXT NOT NULL DEFAULT '', \
             description TEXT NOT NULL DEFAULT '', \
             created_at TEXT NOT NULL, \
             updated_at TEXT NOT NULL)",
            "CREATE INDEX IF NOT EXISTS idx_containers_parent ON containers(parent_id)",
            "CREATE TABLE IF NOT EXISTS memberships (\
             container_id TEXT NOT NULL, \
             member_id TEXT NOT NULL, \
             member_type TEXT NOT NULL, \
             created_at TEXT NOT NULL, \
             PRIMARY KEY (container_id, member_id))",
        ],
    },
    Migration {
        version: 2,
        description: "reverse lookup index on memberships",
        statements: &["CREATE INDEX IF NOT EXISTS idx_memberships_member ON memberships(member_id)"],
    },
];

const POSTGRES_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create containers and memberships",
        statements: &[
            "CREATE TABLE IF NOT EXISTS containers (\
             id TEXT PRIMARY KEY, \
             parent_id TEXT REFERENCES containers(id), \
             container_type TEXT NOT NULL DEFAULT 'basic', \
             title TEXT NOT NULL DEFAULT '', \
             description TEXT NOT NULL DEFAULT '', \
             created_at TIMESTAMPTZ NOT NULL, \
             updated_at TIMESTAMPTZ NOT NULL)",
            "CREATE INDEX IF NOT EXISTS idx_containers_parent ON containers(parent_id)",
            "CREATE TABLE IF NOT EXISTS memberships (\
             container_id TEXT NOT NULL, \
             member_id TEXT NOT NULL, \
             member_type TEXT NOT NULL, \
             created_at TIMESTAMPTZ NOT NULL, \
             PRIMARY KEY (container_id, member_id))",
        ],
    },
    Migration {
        version: 2,
        description: "reverse lookup index on memberships",
        statements: &["CREATE INDEX IF NOT EXISTS idx_memberships_member ON memberships(member_id)"],
    },
];

/// Ordered migrations for a dialect.
pub fn migrations(dialect: Dialect) -> &'static [Migration] {
    match dialect {
        Dialect::Sqlite => SQLITE_MIGRATIONS,
        Dialect::Postgres => POSTGRES_MIGRATIONS,
    }
}

/// Tables that must exist after a successful migration.
pub const REQUIRED_TABLES: &[&str] = &["containers", "memberships", "schema_migrations"];

/// Indexes that must exist after a successful migration.
pub const REQUIRED_INDEXES: &[&str] = &["idx_containers_parent", "idx_memberships_member"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_monotonic() {
        for dialect in [Dialect::Sqlite, Dialect::Postgres] {
            let migrations = migrations(dialect);
            for pair in migrations.windows(2) {
                assert!(pair[0].version < pair[1].version);
            }
        }
    }

    #[test]
    fn test_dialects_have_matching_versions() {
        let sqlite: Vec<_> = migrations(Dialect::Sqlite).iter().map(|m| m.version).collect();
        let postgres: Vec<_> = migrations(Dialect::Postgres).iter().map(|m| m.version).collect();
        assert_eq!(sqlite, postgres);
    }
}
