//! Checksummed filesystem resource store.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ResourceMeta, ResourceStore};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use strata_core::{ContentHash, Resource};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Content file name inside a resource directory.
const CONTENT_FILE: &str = "content";

/// Metadata file name inside a resource directory.
const METADATA_FILE: &str = "metadata.json";

/// Map an ID onto a safe directory name.
///
/// Path separators and `..` are replaced with `_` before any filesystem path
/// is built, so an ID can never escape the store root. The substitution is
/// deterministic; distinct IDs that collide after substitution share a
/// directory, which callers avoid by not using separator characters in IDs.
pub fn sanitize_id(id: &str) -> StorageResult<String> {
    if id.is_empty() {
        return Err(StorageError::InvalidId("ID is empty".to_string()));
    }
    Ok(id.replace("..", "_").replace(['/', '\\'], "_"))
}

/// Filesystem resource store with SHA-256 verification on every full read.
///
/// Layout per resource:
/// ```text
/// <root>/<sanitized-id>/content
/// <root>/<sanitized-id>/metadata.json
/// ```
///
/// No in-process locking: concurrent writes to the same ID race at the
/// filesystem level and the last successful write wins.
pub struct ChecksumStore {
    root: PathBuf,
}

impl ChecksumStore {
    /// Create a new store rooted at the given directory.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory holding per-resource subdirectories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resource_dir(&self, id: &str) -> StorageResult<PathBuf> {
        Ok(self.root.join(sanitize_id(id)?))
    }

    /// Write bytes durably: temp file with a unique name, fsync, then rename.
    async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
        let temp_path = temp_sibling(path);
        let result: StorageResult<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            remove_temp(&temp_path).await;
            return Err(e);
        }
        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    async fn write_meta(&self, dir: &Path, meta: &ResourceMeta) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(meta)?;
        Self::write_atomic(&dir.join(METADATA_FILE), &json).await
    }

    async fn read_meta(&self, id: &str) -> StorageResult<ResourceMeta> {
        let path = self.resource_dir(id)?.join(METADATA_FILE);
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        let meta: ResourceMeta = serde_json::from_slice(&data)?;
        Ok(meta)
    }

    /// Creation time to record for a (re-)store: preserved from any readable
    /// existing metadata, otherwise now.
    async fn created_at_for(&self, id: &str, now: OffsetDateTime) -> OffsetDateTime {
        match self.read_meta(id).await {
            Ok(existing) => existing.created_at,
            Err(_) => now,
        }
    }
}

/// Build a unique temp-file sibling for an atomic write target.
fn temp_sibling(path: &Path) -> PathBuf {
    let temp_name = format!(".tmp.{}", Uuid::new_v4());
    path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
            .unwrap_or_else(|| temp_name.clone()),
    )
}

/// Remove a temp file left behind by a failed write, without masking the
/// original error.
async fn remove_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file");
        }
    }
}

#[async_trait]
impl ResourceStore for ChecksumStore {
    #[instrument(skip(self, resource), fields(id = %resource.id, size = resource.data.len()))]
    async fn store(&self, resource: &Resource) -> StorageResult<ResourceMeta> {
        resource
            .validate()
            .map_err(|e| StorageError::InvalidId(e.to_string()))?;

        let dir = self.resource_dir(&resource.id)?;
        fs::create_dir_all(&dir).await?;

        let checksum = ContentHash::compute(&resource.data);
        Self::write_atomic(&dir.join(CONTENT_FILE), &resource.data).await?;

        let now = OffsetDateTime::now_utc();
        let meta = ResourceMeta {
            id: resource.id.clone(),
            content_type: resource.content_type.clone(),
            original_format: None,
            size: resource.data.len() as u64,
            checksum: checksum.to_hex(),
            created_at: self.created_at_for(&resource.id, now).await,
            updated_at: now,
            tags: resource.tags.clone(),
        };
        self.write_meta(&dir, &meta).await?;
        Ok(meta)
    }

    #[instrument(skip(self))]
    async fn retrieve(&self, id: &str) -> StorageResult<Resource> {
        let meta = self.read_meta(id).await?;
        let content_path = self.resource_dir(id)?.join(CONTENT_FILE);
        let data = fs::read(&content_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        let actual = ContentHash::compute(&data);
        if actual.to_hex() != meta.checksum {
            return Err(StorageError::ChecksumMismatch {
                expected: meta.checksum,
                actual: actual.to_hex(),
            });
        }

        let checksum = ContentHash::from_hex(&meta.checksum)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Resource {
            id: meta.id,
            content_type: meta.content_type,
            data: Bytes::from(data),
            checksum: Some(checksum),
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            tags: meta.tags,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_meta(&self, id: &str) -> StorageResult<ResourceMeta> {
        self.read_meta(id).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> StorageResult<()> {
        let dir = self.resource_dir(id)?;
        fs::remove_dir_all(&dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    #[instrument(skip(self))]
    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let path = self.resource_dir(id)?.join(CONTENT_FILE);
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self, stream))]
    async fn store_stream(
        &self,
        id: &str,
        content_type: &str,
        mut stream: ByteStream,
    ) -> StorageResult<ResourceMeta> {
        let dir = self.resource_dir(id)?;
        fs::create_dir_all(&dir).await?;

        let content_path = dir.join(CONTENT_FILE);
        let temp_path = temp_sibling(&content_path);

        // Fan out each chunk to the destination file and the hash accumulator
        // so memory stays bounded by the chunk size.
        let mut hasher = ContentHash::hasher();
        let mut size: u64 = 0;
        let result: StorageResult<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                hasher.update(&chunk);
                size += chunk.len() as u64;
                file.write_all(&chunk).await?;
            }
            file.sync_all().await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            remove_temp(&temp_path).await;
            return Err(e);
        }
        fs::rename(&temp_path, &content_path).await?;

        let checksum = hasher.finalize();
        let now = OffsetDateTime::now_utc();
        let meta = ResourceMeta {
            id: id.to_string(),
            content_type: content_type.to_string(),
            original_format: None,
            size,
            checksum: checksum.to_hex(),
            created_at: self.created_at_for(id, now).await,
            updated_at: now,
            tags: Default::default(),
        };
        self.write_meta(&dir, &meta).await?;
        Ok(meta)
    }

    #[instrument(skip(self))]
    async fn retrieve_stream(&self, id: &str) -> StorageResult<(ResourceMeta, ByteStream)> {
        let meta = self.read_meta(id).await?;
        let content_path = self.resource_dir(id)?.join(CONTENT_FILE);
        let file = fs::File::open(&content_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        let expected = meta.checksum.clone();
        // The digest can only be finalized after the last byte, so a
        // mismatch surfaces at end-of-stream and never on a partial drain.
        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut hasher = ContentHash::hasher();
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                yield Bytes::copy_from_slice(&buf[..n]);
            }
            let actual = hasher.finalize().to_hex();
            if actual != expected {
                Err(StorageError::ChecksumMismatch { expected, actual })?;
            }
        };

        Ok((meta, Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_id_replaces_separators() {
        assert_eq!(sanitize_id("a/b").unwrap(), "a_b");
        assert_eq!(sanitize_id("a\\b").unwrap(), "a_b");
        assert_eq!(sanitize_id("../etc/passwd").unwrap(), "__etc_passwd");
    }

    #[test]
    fn test_sanitize_id_is_deterministic() {
        assert_eq!(sanitize_id("x/../y").unwrap(), sanitize_id("x/../y").unwrap());
    }

    #[test]
    fn test_sanitize_id_rejects_empty() {
        assert!(matches!(sanitize_id(""), Err(StorageError::InvalidId(_))));
    }

    #[test]
    fn test_plain_ids_pass_through() {
        assert_eq!(sanitize_id("doc-1").unwrap(), "doc-1");
    }
}
