//! Streaming store/retrieve tests, including the checksum-at-EOF contract.

mod common;

use bytes::Bytes;
use common::{seeded_bytes, sha256_hash};
use futures::StreamExt;
use strata_storage::{ByteStream, ChecksumStore, ResourceStore, StorageError};
use tempfile::TempDir;

async fn new_store() -> (TempDir, ChecksumStore) {
    let temp = TempDir::new().unwrap();
    let store = ChecksumStore::new(temp.path().join("resources"))
        .await
        .unwrap();
    (temp, store)
}

fn chunked_stream(data: Bytes, chunk_size: usize) -> ByteStream {
    let chunks: Vec<_> = data
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

async fn drain(mut stream: ByteStream) -> Result<Vec<u8>, StorageError> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

#[tokio::test]
async fn test_store_stream_computes_checksum() {
    let (_temp, store) = new_store().await;
    let data = seeded_bytes(7, 256 * 1024);

    let meta = store
        .store_stream("big", "application/octet-stream", chunked_stream(data.clone(), 8192))
        .await
        .unwrap();

    assert_eq!(meta.size, data.len() as u64);
    assert_eq!(meta.checksum, sha256_hash(&data));

    let retrieved = store.retrieve("big").await.unwrap();
    assert_eq!(retrieved.data, data);
}

#[tokio::test]
async fn test_store_stream_failure_removes_partial_content() {
    let (temp, store) = new_store().await;

    let stream: ByteStream = Box::pin(futures::stream::iter(vec![
        Ok(Bytes::from_static(b"partial")),
        Err(StorageError::Serialization("upstream broke".to_string())),
    ]));

    let result = store
        .store_stream("broken", "application/octet-stream", stream)
        .await;
    assert!(result.is_err());

    // The partially-written temp file must be gone and no content committed.
    let dir = temp.path().join("resources/broken");
    if dir.exists() {
        let leftovers: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
    }
    assert!(!store.exists("broken").await.unwrap());
}

#[tokio::test]
async fn test_retrieve_stream_full_drain_verifies() {
    let (_temp, store) = new_store().await;
    let data = seeded_bytes(8, 200_000);
    store
        .store_stream("r", "application/octet-stream", chunked_stream(data.clone(), 4096))
        .await
        .unwrap();

    let (meta, stream) = store.retrieve_stream("r").await.unwrap();
    assert_eq!(meta.size, data.len() as u64);
    assert_eq!(drain(stream).await.unwrap(), data.to_vec());
}

#[tokio::test]
async fn test_retrieve_stream_reports_corruption_at_eof() {
    let (temp, store) = new_store().await;
    let data = seeded_bytes(9, 100_000);
    store
        .store_stream("victim", "application/octet-stream", chunked_stream(data, 4096))
        .await
        .unwrap();

    let content_path = temp.path().join("resources/victim/content");
    let mut bytes = std::fs::read(&content_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&content_path, &bytes).unwrap();

    let (_meta, stream) = store.retrieve_stream("victim").await.unwrap();
    match drain(stream).await {
        Err(StorageError::ChecksumMismatch { .. }) => {}
        other => panic!("expected checksum mismatch at EOF, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retrieve_stream_prefix_read_never_errors() {
    let (temp, store) = new_store().await;
    let data = seeded_bytes(10, 256 * 1024);
    store
        .store_stream("victim", "application/octet-stream", chunked_stream(data, 8192))
        .await
        .unwrap();

    let content_path = temp.path().join("resources/victim/content");
    let mut bytes = std::fs::read(&content_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&content_path, &bytes).unwrap();

    // Reading only the first chunk and dropping the stream must not surface
    // the corruption; the digest is only finalized at end-of-stream.
    let (_meta, mut stream) = store.retrieve_stream("victim").await.unwrap();
    let first = stream.next().await.unwrap();
    assert!(first.is_ok());
    drop(stream);
}

#[tokio::test]
async fn test_retrieve_stream_missing_resource() {
    let (_temp, store) = new_store().await;
    assert!(matches!(
        store.retrieve_stream("absent").await,
        Err(StorageError::NotFound(_))
    ));
}
