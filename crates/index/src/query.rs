//! Dialect-keyed SQL generation.
//!
//! Placeholder syntax, upsert idioms, and the dynamic member-listing queries
//! differ between the two backends; everything dialect-specific lives behind
//! named methods here instead of inline string switches at call sites.

use crate::models::{MemberFilter, MemberSort, SortDirection, SortField};
use strata_core::Pagination;

/// SQL dialect selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Parameter placeholder for the 1-based position `n`.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${n}"),
        }
    }

    /// Upsert statement for a membership edge.
    ///
    /// Both backends name the conflict target and keep the original
    /// `created_at`, so re-indexing an existing edge never moves it in
    /// insertion order.
    pub fn upsert_membership(&self) -> &'static str {
        match self {
            Dialect::Sqlite => {
                "INSERT INTO memberships (container_id, member_id, member_type, created_at) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT (container_id, member_id) DO UPDATE SET member_type = excluded.member_type"
            }
            Dialect::Postgres => {
                "INSERT INTO memberships (container_id, member_id, member_type, created_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (container_id, member_id) DO UPDATE SET member_type = EXCLUDED.member_type"
            }
        }
    }

    /// Upsert statement for a container record. As with memberships, the
    /// conflict clause leaves `created_at` untouched on both backends.
    pub fn upsert_container(&self) -> &'static str {
        match self {
            Dialect::Sqlite => {
                "INSERT INTO containers \
                 (id, parent_id, container_type, title, description, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (id) DO UPDATE SET \
                 parent_id = excluded.parent_id, container_type = excluded.container_type, \
                 title = excluded.title, description = excluded.description, \
                 updated_at = excluded.updated_at"
            }
            Dialect::Postgres => {
                "INSERT INTO containers \
                 (id, parent_id, container_type, title, description, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO UPDATE SET \
                 parent_id = EXCLUDED.parent_id, container_type = EXCLUDED.container_type, \
                 title = EXCLUDED.title, description = EXCLUDED.description, \
                 updated_at = EXCLUDED.updated_at"
            }
        }
    }

    /// Pagination clause. A `limit` of zero means all remaining rows from
    /// `offset`, which each backend spells differently.
    fn pagination_clause(&self, page: &Pagination) -> String {
        if page.limit > 0 {
            format!(" LIMIT {} OFFSET {}", page.limit, page.offset)
        } else if page.offset > 0 {
            match self {
                Dialect::Sqlite => format!(" LIMIT -1 OFFSET {}", page.offset),
                Dialect::Postgres => format!(" OFFSET {}", page.offset),
            }
        } else {
            String::new()
        }
    }
}

/// A built query plus its string bind values, in placeholder order.
#[derive(Debug)]
pub struct BuiltQuery {
    pub sql: String,
    pub binds: Vec<String>,
}

fn push_filter(
    dialect: Dialect,
    sql: &mut String,
    binds: &mut Vec<String>,
    filter: &MemberFilter,
) {
    if let Some(member_type) = filter.member_type {
        sql.push_str(&format!(
            " AND member_type = {}",
            dialect.placeholder(binds.len() + 1)
        ));
        binds.push(member_type.as_str().to_string());
    }
    if let Some(pattern) = &filter.name_pattern {
        sql.push_str(&format!(
            " AND member_id LIKE {}",
            dialect.placeholder(binds.len() + 1)
        ));
        binds.push(format!("%{pattern}%"));
    }
}

/// Build the member listing query: filter, then sort, then paginate.
pub fn member_query(
    dialect: Dialect,
    container_id: &str,
    filter: &MemberFilter,
    sort: &MemberSort,
    page: &Pagination,
) -> BuiltQuery {
    let mut sql = format!(
        "SELECT container_id, member_id, member_type, created_at FROM memberships \
         WHERE container_id = {}",
        dialect.placeholder(1)
    );
    let mut binds = vec![container_id.to_string()];

    push_filter(dialect, &mut sql, &mut binds, filter);

    let key = match sort.field {
        SortField::Name => "member_id",
        SortField::CreatedAt => "created_at",
    };
    let direction = match sort.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    // Secondary key keeps ordering stable when timestamps collide.
    sql.push_str(&format!(" ORDER BY {key} {direction}, member_id {direction}"));
    sql.push_str(&dialect.pagination_clause(page));

    BuiltQuery { sql, binds }
}

/// Build the count query over the same predicate space as `member_query`.
pub fn member_count_query(
    dialect: Dialect,
    container_id: &str,
    filter: &MemberFilter,
) -> BuiltQuery {
    let mut sql = format!(
        "SELECT COUNT(*) FROM memberships WHERE container_id = {}",
        dialect.placeholder(1)
    );
    let mut binds = vec![container_id.to_string()];
    push_filter(dialect, &mut sql, &mut binds, filter);
    BuiltQuery { sql, binds }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::MemberType;

    #[test]
    fn test_placeholder_syntax() {
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
    }

    #[test]
    fn test_member_query_plain() {
        let q = member_query(
            Dialect::Sqlite,
            "c1",
            &MemberFilter::default(),
            &MemberSort::default(),
            &Pagination::all(),
        );
        assert_eq!(q.binds, vec!["c1"]);
        assert!(q.sql.contains("ORDER BY created_at ASC"));
        assert!(!q.sql.contains("LIMIT"));
    }

    #[test]
    fn test_member_query_filters_numbered_for_postgres() {
        let filter = MemberFilter {
            member_type: Some(MemberType::Resource),
            name_pattern: Some("doc".to_string()),
        };
        let q = member_query(
            Dialect::Postgres,
            "c1",
            &filter,
            &MemberSort::default(),
            &Pagination::new(5, 10),
        );
        assert!(q.sql.contains("member_type = $2"));
        assert!(q.sql.contains("member_id LIKE $3"));
        assert!(q.sql.ends_with("LIMIT 5 OFFSET 10"));
        assert_eq!(q.binds, vec!["c1", "resource", "%doc%"]);
    }

    #[test]
    fn test_zero_limit_with_offset() {
        let q = member_query(
            Dialect::Sqlite,
            "c1",
            &MemberFilter::default(),
            &MemberSort::default(),
            &Pagination::new(0, 4),
        );
        assert!(q.sql.ends_with("LIMIT -1 OFFSET 4"));

        let q = member_query(
            Dialect::Postgres,
            "c1",
            &MemberFilter::default(),
            &MemberSort::default(),
            &Pagination::new(0, 4),
        );
        assert!(q.sql.ends_with("OFFSET 4"));
        assert!(!q.sql.contains("LIMIT"));
    }

    #[test]
    fn test_sort_by_name_descending() {
        let sort = MemberSort {
            field: SortField::Name,
            direction: SortDirection::Descending,
        };
        let q = member_query(
            Dialect::Sqlite,
            "c1",
            &MemberFilter::default(),
            &sort,
            &Pagination::all(),
        );
        assert!(q.sql.contains("ORDER BY member_id DESC"));
    }
}
