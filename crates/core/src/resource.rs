//! Resource model: an opaque, checksummed byte blob with a unique ID.

use crate::hash::ContentHash;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// An immutable-content byte blob identified by a unique string ID.
///
/// System attributes (checksum, size, timestamps) are typed fields; open
/// extension metadata lives in `tags` as a string-to-string map validated at
/// the boundary.
#[derive(Clone, Debug)]
pub struct Resource {
    /// Unique, non-empty identifier.
    pub id: String,
    /// MIME content type.
    pub content_type: String,
    /// Raw content bytes.
    pub data: Bytes,
    /// SHA-256 digest of `data` at the moment of the last successful write.
    /// `None` until the resource has been stored.
    pub checksum: Option<ContentHash>,
    /// Creation time.
    pub created_at: OffsetDateTime,
    /// Last update time.
    pub updated_at: OffsetDateTime,
    /// Open extension metadata, used for secondary indexing.
    pub tags: BTreeMap<String, String>,
}

impl Resource {
    /// Create a new resource with the given ID, content type, and data.
    pub fn new(id: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            content_type: content_type.into(),
            data,
            checksum: None,
            created_at: now,
            updated_at: now,
            tags: BTreeMap::new(),
        }
    }

    /// Byte length of the content.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Attach an extension tag. Keys and values are plain strings; anything
    /// richer must be encoded by the caller before it reaches the store.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Validate the resource for storage.
    pub fn validate(&self) -> crate::Result<()> {
        if self.id.is_empty() {
            return Err(crate::Error::InvalidId("resource ID is empty".to_string()));
        }
        Ok(())
    }
}

/// Pagination window for listing operations.
///
/// `limit == 0` means "all remaining rows from `offset`".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    /// Create a pagination window.
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// A window returning all rows.
    pub fn all() -> Self {
        Self::default()
    }
}
