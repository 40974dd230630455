//! In-memory secondary index over resource metadata.
//!
//! The index accelerates lookups by content type, tag, and size without
//! touching the resource directories. It is a rebuildable projection: the
//! snapshot on disk is a convenience for fast startup, and `rebuild` can
//! always reconstruct the whole index from the per-resource metadata files.

use crate::error::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use strata_storage::{sanitize_id, ResourceMeta};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// One indexed resource.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub content_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Directory name under the resources root.
    pub path: String,
}

impl IndexEntry {
    fn from_meta(meta: &ResourceMeta) -> RepoResult<Self> {
        let path = sanitize_id(&meta.id).map_err(|e| RepoError::InvalidId(e.to_string()))?;
        Ok(Self {
            id: meta.id.clone(),
            content_type: meta.content_type.clone(),
            size: meta.size,
            tags: meta.tags.clone(),
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            path,
        })
    }
}

/// Aggregate index statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecondaryIndexStats {
    pub resource_count: usize,
    pub total_bytes: u64,
    /// Mean resource size in bytes; zero for an empty index.
    pub average_size: u64,
    /// Resource count per content type.
    pub content_types: BTreeMap<String, u64>,
}

/// In-memory resource index with a write-through JSON snapshot.
///
/// All queries are O(n) scans over the map; the expected scale is the
/// working set of one store, not a search engine's corpus.
pub struct SecondaryIndex {
    entries: tokio::sync::RwLock<HashMap<String, IndexEntry>>,
    snapshot_path: PathBuf,
    resources_dir: PathBuf,
}

impl SecondaryIndex {
    /// Open the index, loading any existing snapshot.
    pub async fn open(
        snapshot_path: impl Into<PathBuf>,
        resources_dir: impl Into<PathBuf>,
    ) -> RepoResult<Self> {
        let snapshot_path = snapshot_path.into();
        if let Some(parent) = snapshot_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut entries = HashMap::new();
        match fs::read(&snapshot_path).await {
            Ok(data) => {
                let loaded: Vec<IndexEntry> = serde_json::from_slice(&data)?;
                entries = loaded.into_iter().map(|e| (e.id.clone(), e)).collect();
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            entries: tokio::sync::RwLock::new(entries),
            snapshot_path,
            resources_dir: resources_dir.into(),
        })
    }

    /// Serialize the map to the snapshot file, sorted by ID so the file is
    /// byte-stable across runs. Called with the write lock held so snapshot
    /// writes stay serialized.
    async fn persist(&self, entries: &HashMap<String, IndexEntry>) -> RepoResult<()> {
        let mut sorted: Vec<&IndexEntry> = entries.values().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        let json = serde_json::to_vec_pretty(&sorted)?;

        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = self.snapshot_path.with_file_name(
            self.snapshot_path
                .file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        let result: RepoResult<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&json).await?;
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
        fs::rename(&temp_path, &self.snapshot_path).await?;
        Ok(())
    }

    /// Index a resource from its metadata record, replacing any previous
    /// entry under the same ID.
    #[instrument(skip(self, meta), fields(id = %meta.id))]
    pub async fn add_resource(&self, meta: &ResourceMeta) -> RepoResult<()> {
        let entry = IndexEntry::from_meta(meta)?;
        let mut entries = self.entries.write().await;
        entries.insert(entry.id.clone(), entry);
        self.persist(&entries).await
    }

    /// Drop a resource from the index. Returns whether it was present.
    #[instrument(skip(self))]
    pub async fn remove_resource(&self, id: &str) -> RepoResult<bool> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(id).is_some();
        if removed {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    /// Look up one entry by ID.
    pub async fn find_by_id(&self, id: &str) -> Option<IndexEntry> {
        self.entries.read().await.get(id).cloned()
    }

    /// All entries with the given content type, ordered by ID.
    pub async fn find_by_content_type(&self, content_type: &str) -> Vec<IndexEntry> {
        self.scan(|e| e.content_type == content_type).await
    }

    /// All entries carrying the given tag key/value pair, ordered by ID.
    pub async fn find_by_tag(&self, key: &str, value: &str) -> Vec<IndexEntry> {
        self.scan(|e| e.tags.get(key).is_some_and(|v| v == value))
            .await
    }

    /// All entries whose size falls in `[min, max]` inclusive, ordered by ID.
    pub async fn find_by_size_range(&self, min: u64, max: u64) -> Vec<IndexEntry> {
        self.scan(|e| e.size >= min && e.size <= max).await
    }

    async fn scan(&self, pred: impl Fn(&IndexEntry) -> bool) -> Vec<IndexEntry> {
        let entries = self.entries.read().await;
        let mut matched: Vec<IndexEntry> = entries.values().filter(|e| pred(e)).cloned().collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Rebuild the index from the per-resource metadata files.
    ///
    /// Unreadable or malformed metadata files are skipped with a warning
    /// rather than failing the whole rebuild; the resources they belong to
    /// simply drop out of the index until they are re-stored. Returns the
    /// number of indexed resources.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> RepoResult<usize> {
        let mut rebuilt = HashMap::new();
        let mut dir = match fs::read_dir(&self.resources_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut entries = self.entries.write().await;
                *entries = rebuilt;
                self.persist(&entries).await?;
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(dirent) = dir.next_entry().await? {
            let meta_path = dirent.path().join("metadata.json");
            let data = match fs::read(&meta_path).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(
                        path = %meta_path.display(),
                        error = %e,
                        "skipping unreadable metadata during rebuild"
                    );
                    continue;
                }
            };
            let meta: ResourceMeta = match serde_json::from_slice(&data) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(
                        path = %meta_path.display(),
                        error = %e,
                        "skipping malformed metadata during rebuild"
                    );
                    continue;
                }
            };
            match IndexEntry::from_meta(&meta) {
                Ok(entry) => {
                    rebuilt.insert(entry.id.clone(), entry);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %meta_path.display(),
                        error = %e,
                        "skipping invalid metadata during rebuild"
                    );
                }
            }
        }

        let count = rebuilt.len();
        let mut entries = self.entries.write().await;
        *entries = rebuilt;
        self.persist(&entries).await?;
        tracing::info!(resources = count, "secondary index rebuilt");
        Ok(count)
    }

    /// Aggregate counts over the current index contents.
    pub async fn stats(&self) -> SecondaryIndexStats {
        let entries = self.entries.read().await;
        let mut stats = SecondaryIndexStats::default();
        for entry in entries.values() {
            stats.resource_count += 1;
            stats.total_bytes += entry.size;
            *stats
                .content_types
                .entry(entry.content_type.clone())
                .or_insert(0) += 1;
        }
        if stats.resource_count > 0 {
            stats.average_size = stats.total_bytes / stats.resource_count as u64;
        }
        stats
    }

    /// Path to the snapshot file backing this index.
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}
