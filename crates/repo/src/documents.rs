//! On-disk container documents.
//!
//! A container's content bytes persist through the checksummed resource
//! store; the collection attributes (parent, type, title, members) persist
//! as a JSON sidecar document in the same directory, written with the same
//! temp-file-and-rename idiom so a crash never leaves a half-written
//! document behind.

use crate::error::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_core::{Container, ContainerType};
use strata_storage::sanitize_id;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Document file name inside a container directory.
const DOCUMENT_FILE: &str = "container.json";

/// The collection half of a persisted container.
///
/// Everything a [`Container`] carries beyond its resource attributes; the
/// content bytes, checksum, and tags live next door in the resource store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDoc {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub container_type: ContainerType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ContainerDoc {
    /// Project the collection attributes out of a full container.
    pub fn from_container(container: &Container) -> Self {
        Self {
            id: container.id.clone(),
            parent_id: container.parent_id.clone(),
            container_type: container.container_type,
            title: container.title.clone(),
            description: container.description.clone(),
            members: container.members.clone(),
            created_at: container.created_at,
            updated_at: container.updated_at,
        }
    }
}

/// Filesystem store for container documents.
///
/// Layout per container (content and metadata written by the resource
/// store, the document by this store):
/// ```text
/// <root>/<sanitized-id>/content
/// <root>/<sanitized-id>/metadata.json
/// <root>/<sanitized-id>/container.json
/// ```
pub struct ContainerDocStore {
    root: PathBuf,
}

impl ContainerDocStore {
    /// Create a new document store rooted at the given directory.
    pub async fn new(root: impl AsRef<Path>) -> RepoResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn container_dir(&self, id: &str) -> RepoResult<PathBuf> {
        let safe = sanitize_id(id).map_err(|e| RepoError::InvalidId(e.to_string()))?;
        Ok(self.root.join(safe))
    }

    async fn write_atomic(path: &Path, data: &[u8]) -> RepoResult<()> {
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        let result: RepoResult<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %temp_path.display(),
                        error = %cleanup,
                        "failed to remove temp file"
                    );
                }
            }
            return Err(e);
        }
        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    /// Persist a container document, replacing any previous version.
    pub async fn write(&self, doc: &ContainerDoc) -> RepoResult<()> {
        let dir = self.container_dir(&doc.id)?;
        fs::create_dir_all(&dir).await?;
        let json = serde_json::to_vec_pretty(doc)?;
        Self::write_atomic(&dir.join(DOCUMENT_FILE), &json).await
    }

    /// Read and deserialize a container document.
    pub async fn read(&self, id: &str) -> RepoResult<ContainerDoc> {
        let path = self.container_dir(id)?.join(DOCUMENT_FILE);
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RepoError::NotFound(format!("container {id}"))
            } else {
                RepoError::Io(e)
            }
        })?;
        let doc: ContainerDoc = serde_json::from_slice(&data)?;
        Ok(doc)
    }

    /// Remove a container's directory and everything in it.
    pub async fn delete(&self, id: &str) -> RepoResult<()> {
        let dir = self.container_dir(id)?;
        fs::remove_dir_all(&dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RepoError::NotFound(format!("container {id}"))
            } else {
                RepoError::Io(e)
            }
        })
    }

    /// Remove a container's directory if present, logging instead of failing.
    /// Used for cleanup after a partially completed create.
    pub async fn delete_best_effort(&self, id: &str) {
        let Ok(dir) = self.container_dir(id) else {
            return;
        };
        if let Err(e) = fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(id = id, error = %e, "failed to clean up container directory");
            }
        }
    }

    /// Pure existence probe for the document file. Distinguishes containers
    /// from plain resources sharing the directory layout.
    pub async fn exists(&self, id: &str) -> RepoResult<bool> {
        let path = self.container_dir(id)?.join(DOCUMENT_FILE);
        fs::try_exists(&path).await.map_err(RepoError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn doc(id: &str) -> ContainerDoc {
        ContainerDoc::from_container(&Container::new(id))
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let temp = tempdir().unwrap();
        let store = ContainerDocStore::new(temp.path()).await.unwrap();

        let mut doc = doc("c1");
        doc.title = "Reports".to_string();
        doc.members.push("doc-1".to_string());
        store.write(&doc).await.unwrap();

        let loaded = store.read("c1").await.unwrap();
        assert_eq!(loaded.id, "c1");
        assert_eq!(loaded.title, "Reports");
        assert_eq!(loaded.members, vec!["doc-1"]);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let temp = tempdir().unwrap();
        let store = ContainerDocStore::new(temp.path()).await.unwrap();
        assert!(matches!(
            store.read("ghost").await,
            Err(RepoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_ids_stay_under_root() {
        let temp = tempdir().unwrap();
        let store = ContainerDocStore::new(temp.path()).await.unwrap();

        store.write(&doc("../escape")).await.unwrap();
        assert!(temp.path().join("__escape").join(DOCUMENT_FILE).exists());
    }

    #[tokio::test]
    async fn test_delete_removes_directory() {
        let temp = tempdir().unwrap();
        let store = ContainerDocStore::new(temp.path()).await.unwrap();

        store.write(&doc("c1")).await.unwrap();
        store.delete("c1").await.unwrap();
        assert!(!store.exists("c1").await.unwrap());
        assert!(matches!(
            store.delete("c1").await,
            Err(RepoError::NotFound(_))
        ));
    }
}
