//! PostgreSQL parity tests for the membership index.
//!
//! These run against a live database named by STRATA_POSTGRES_TEST_URL and
//! are skipped when the variable is unset, so the default test run needs no
//! external services. Both backends must honor identical semantics; the
//! assertions here mirror the SQLite suite for the behaviors most likely to
//! diverge across dialects (upserts, pagination, ordering).

use strata_core::{ContainerType, MemberType, Pagination};
use strata_index::{
    ContainerRecordRepo, ContainerRow, IndexError, MembershipRepo, PostgresIndex,
};
use time::OffsetDateTime;

/// Connect to the test database, or skip when none is configured.
async fn postgres_or_skip() -> Option<PostgresIndex> {
    let url = match std::env::var("STRATA_POSTGRES_TEST_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping PostgreSQL test (STRATA_POSTGRES_TEST_URL unset)");
            return None;
        }
    };
    Some(
        PostgresIndex::from_url(&url, 2, None)
            .await
            .expect("PostgreSQL test setup failed"),
    )
}

fn container_row(id: &str, parent_id: Option<&str>) -> ContainerRow {
    let now = OffsetDateTime::now_utc();
    ContainerRow {
        id: id.to_string(),
        parent_id: parent_id.map(str::to_string),
        container_type: ContainerType::Basic,
        title: String::new(),
        description: String::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Unique ID prefix per test run so suites can share a database.
fn unique(prefix: &str) -> String {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("{prefix}-{nanos}")
}

#[tokio::test]
async fn test_postgres_upsert_and_member_typing() {
    let Some(index) = postgres_or_skip().await else {
        return;
    };
    let c1 = unique("c1");
    let c2 = unique("c2");
    let doc = unique("doc");

    index.upsert_container(&container_row(&c1, None)).await.unwrap();
    index.upsert_container(&container_row(&c2, None)).await.unwrap();

    assert_eq!(
        index.index_membership(&c1, &c2).await.unwrap(),
        MemberType::Container
    );
    assert_eq!(
        index.index_membership(&c1, &doc).await.unwrap(),
        MemberType::Resource
    );

    // Idempotent upsert with the explicit conflict target.
    index.index_membership(&c1, &doc).await.unwrap();
    assert_eq!(index.get_member_count(&c1).await.unwrap(), 2);
}

#[tokio::test]
async fn test_postgres_reindex_keeps_original_position() {
    let Some(index) = postgres_or_skip().await else {
        return;
    };
    let c1 = unique("c1");
    index.upsert_container(&container_row(&c1, None)).await.unwrap();
    index.index_membership(&c1, "m0").await.unwrap();
    index.index_membership(&c1, "m1").await.unwrap();

    index.index_membership(&c1, "m0").await.unwrap();

    let members = index.get_members(&c1, &Pagination::all()).await.unwrap();
    let ids: Vec<_> = members.iter().map(|m| m.member_id.as_str()).collect();
    assert_eq!(ids, vec!["m0", "m1"]);
}

#[tokio::test]
async fn test_postgres_remove_membership_asymmetry() {
    let Some(index) = postgres_or_skip().await else {
        return;
    };
    let c1 = unique("c1");
    let doc = unique("doc");
    index.upsert_container(&container_row(&c1, None)).await.unwrap();
    index.index_membership(&c1, &doc).await.unwrap();

    index.remove_membership(&c1, &doc).await.unwrap();
    match index.remove_membership(&c1, &doc).await {
        Err(IndexError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_postgres_pagination_ordering() {
    let Some(index) = postgres_or_skip().await else {
        return;
    };
    let c1 = unique("c1");
    index.upsert_container(&container_row(&c1, None)).await.unwrap();
    for i in 0..10 {
        index
            .index_membership(&c1, &format!("m{i:02}"))
            .await
            .unwrap();
    }

    let mut paged = Vec::new();
    for offset in [0u32, 3, 6] {
        let page = index
            .get_members(&c1, &Pagination::new(3, offset))
            .await
            .unwrap();
        paged.extend(page.into_iter().map(|m| m.member_id));
    }
    let first_nine: Vec<_> = index
        .get_members(&c1, &Pagination::new(9, 0))
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.member_id)
        .collect();
    assert_eq!(paged, first_nine);
}
