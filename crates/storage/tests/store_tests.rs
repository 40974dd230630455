//! Integration tests for the checksummed filesystem store.

mod common;

use bytes::Bytes;
use common::{seeded_bytes, sha256_hash};
use strata_core::Resource;
use strata_storage::{ChecksumStore, ResourceStore, StorageError};
use tempfile::TempDir;

async fn new_store() -> (TempDir, ChecksumStore) {
    let temp = TempDir::new().unwrap();
    let store = ChecksumStore::new(temp.path().join("resources"))
        .await
        .unwrap();
    (temp, store)
}

#[tokio::test]
async fn test_store_retrieve_roundtrip() {
    let (_temp, store) = new_store().await;
    let data = seeded_bytes(1, 4096);

    let meta = store
        .store(&Resource::new("r1", "application/octet-stream", data.clone()))
        .await
        .unwrap();
    assert_eq!(meta.size, 4096);
    assert_eq!(meta.checksum, sha256_hash(&data));

    let retrieved = store.retrieve("r1").await.unwrap();
    assert_eq!(retrieved.data, data);
    assert_eq!(retrieved.content_type, "application/octet-stream");
    assert_eq!(retrieved.checksum.unwrap().to_hex(), meta.checksum);
}

#[tokio::test]
async fn test_roundtrip_does_not_disturb_other_resources() {
    let (_temp, store) = new_store().await;
    let a = seeded_bytes(10, 100);
    let b = seeded_bytes(11, 200);

    store
        .store(&Resource::new("a", "text/plain", a.clone()))
        .await
        .unwrap();
    store
        .store(&Resource::new("b", "text/plain", b.clone()))
        .await
        .unwrap();
    store
        .store(&Resource::new("a", "text/plain", seeded_bytes(12, 150)))
        .await
        .unwrap();

    assert_eq!(store.retrieve("b").await.unwrap().data, b);
}

#[tokio::test]
async fn test_store_rejects_empty_id() {
    let (_temp, store) = new_store().await;
    let result = store
        .store(&Resource::new("", "text/plain", Bytes::from_static(b"x")))
        .await;
    assert!(matches!(result, Err(StorageError::InvalidId(_))));
}

#[tokio::test]
async fn test_overwrite_last_write_wins() {
    let (_temp, store) = new_store().await;
    store
        .store(&Resource::new("r1", "text/plain", Bytes::from_static(b"first")))
        .await
        .unwrap();
    let first_meta = store.retrieve_meta("r1").await.unwrap();

    store
        .store(&Resource::new("r1", "text/plain", Bytes::from_static(b"second")))
        .await
        .unwrap();

    let retrieved = store.retrieve("r1").await.unwrap();
    assert_eq!(retrieved.data, Bytes::from_static(b"second"));
    // Re-store under the same ID preserves the original creation time.
    assert_eq!(retrieved.created_at, first_meta.created_at);
}

#[tokio::test]
async fn test_lifecycle_scenario() {
    let (_temp, store) = new_store().await;
    store
        .store(&Resource::new("r1", "text/plain", Bytes::from_static(b"12345")))
        .await
        .unwrap();

    assert!(store.exists("r1").await.unwrap());
    assert_eq!(store.retrieve("r1").await.unwrap().size(), 5);

    store.delete("r1").await.unwrap();
    assert!(!store.exists("r1").await.unwrap());
    assert!(matches!(
        store.retrieve("r1").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_missing_resource() {
    let (_temp, store) = new_store().await;
    assert!(matches!(
        store.delete("nope").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_corruption_detected_on_retrieve() {
    let (temp, store) = new_store().await;
    let data = seeded_bytes(2, 1024);
    store
        .store(&Resource::new("victim", "application/octet-stream", data))
        .await
        .unwrap();

    // Corrupt the content file behind the store's back.
    let content_path = temp.path().join("resources/victim/content");
    let mut bytes = std::fs::read(&content_path).unwrap();
    bytes[0] ^= 0xff;
    std::fs::write(&content_path, &bytes).unwrap();

    match store.retrieve("victim").await {
        Err(StorageError::ChecksumMismatch { expected, actual }) => {
            assert_ne!(expected, actual);
        }
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_traversal_ids_stay_under_root() {
    let (temp, store) = new_store().await;
    store
        .store(&Resource::new(
            "../escape",
            "text/plain",
            Bytes::from_static(b"x"),
        ))
        .await
        .unwrap();

    // Nothing may be written outside the store root.
    assert!(!temp.path().join("escape").exists());
    assert!(temp.path().join("resources/__escape/content").exists());
    assert!(store.exists("../escape").await.unwrap());
}

#[tokio::test]
async fn test_tags_roundtrip_through_metadata() {
    let (_temp, store) = new_store().await;
    let resource = Resource::new("tagged", "text/plain", Bytes::from_static(b"x"))
        .with_tag("project", "alpha")
        .with_tag("owner", "docs");
    store.store(&resource).await.unwrap();

    let meta = store.retrieve_meta("tagged").await.unwrap();
    assert_eq!(meta.tags.get("project").map(String::as_str), Some("alpha"));
    assert_eq!(meta.tags.get("owner").map(String::as_str), Some("docs"));
}
