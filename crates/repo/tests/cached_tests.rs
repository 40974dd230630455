//! Integration tests for the cache-aside wrappers.

mod common;

use bytes::Bytes;
use common::new_repo;
use strata_core::config::CacheConfig;
use strata_core::{Container, Resource};
use strata_storage::{ChecksumStore, ResourceStore};
use strata_repo::{CachedContainerRepository, CachedResourceStore, ContainerRepository};

fn small_cache() -> CacheConfig {
    CacheConfig {
        max_bytes: 1024 * 1024,
        max_entries: 16,
        ttl_secs: 60,
    }
}

#[tokio::test]
async fn test_cached_store_serves_repeat_reads_from_cache() {
    let temp = tempfile::tempdir().unwrap();
    let inner = ChecksumStore::new(temp.path()).await.unwrap();
    let store = CachedResourceStore::new(inner, small_cache());

    let resource = Resource::new("r1", "text/plain", Bytes::from_static(b"hello"));
    store.store(&resource).await.unwrap();

    store.retrieve("r1").await.unwrap();
    store.retrieve("r1").await.unwrap();

    let stats = store.cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_cached_store_invalidates_on_mutation() {
    let temp = tempfile::tempdir().unwrap();
    let inner = ChecksumStore::new(temp.path()).await.unwrap();
    let store = CachedResourceStore::new(inner, small_cache());

    store
        .store(&Resource::new("r1", "text/plain", Bytes::from_static(b"v1")))
        .await
        .unwrap();
    assert_eq!(store.retrieve("r1").await.unwrap().data.as_ref(), b"v1");

    store
        .store(&Resource::new("r1", "text/plain", Bytes::from_static(b"v2")))
        .await
        .unwrap();
    assert_eq!(store.retrieve("r1").await.unwrap().data.as_ref(), b"v2");

    store.delete("r1").await.unwrap();
    assert!(store.retrieve("r1").await.is_err());
}

#[tokio::test]
async fn test_cached_store_streams_bypass_cache() {
    let temp = tempfile::tempdir().unwrap();
    let inner = ChecksumStore::new(temp.path()).await.unwrap();
    let store = CachedResourceStore::new(inner, small_cache());

    store
        .store(&Resource::new("r1", "text/plain", Bytes::from_static(b"hello")))
        .await
        .unwrap();
    let (_meta, _stream) = store.retrieve_stream("r1").await.unwrap();

    assert_eq!(store.cache().stats().entries, 0);
}

#[tokio::test]
async fn test_cached_repository_invalidates_after_member_changes() {
    let (_temp, inner) = new_repo().await;
    let repo = CachedContainerRepository::new(inner, small_cache());

    repo.create_container(&Container::new("c1")).await.unwrap();
    assert!(repo.get_container("c1").await.unwrap().members.is_empty());

    // The cached document must not mask the mutation.
    repo.add_member("c1", "doc-1").await.unwrap();
    assert_eq!(repo.get_container("c1").await.unwrap().members, vec!["doc-1"]);

    repo.remove_member("c1", "doc-1").await.unwrap();
    assert!(repo.get_container("c1").await.unwrap().members.is_empty());
}

#[tokio::test]
async fn test_cached_repository_delete_invalidates() {
    let (_temp, inner) = new_repo().await;
    let repo = CachedContainerRepository::new(inner, small_cache());

    repo.create_container(&Container::new("c1")).await.unwrap();
    repo.get_container("c1").await.unwrap();
    repo.delete_container("c1").await.unwrap();

    assert!(repo.get_container("c1").await.is_err());
    assert!(!repo.container_exists("c1").await.unwrap());
}

#[tokio::test]
async fn test_cached_repository_update_invalidates() {
    let (_temp, inner) = new_repo().await;
    let repo = CachedContainerRepository::new(inner, small_cache());

    let created = repo.create_container(&Container::new("c1")).await.unwrap();
    repo.get_container("c1").await.unwrap();

    let mut changed = created.clone();
    changed.title = "Renamed".to_string();
    repo.update_container(&changed).await.unwrap();

    assert_eq!(repo.get_container("c1").await.unwrap().title, "Renamed");
}
