//! Container model: a resource that owns an ordered set of member IDs.

use crate::hash::ContentHash;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

/// Container flavor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    #[default]
    Basic,
    Direct,
}

impl ContainerType {
    /// Stable string form used in the relational index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Direct => "direct",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "basic" => Ok(Self::Basic),
            "direct" => Ok(Self::Direct),
            other => Err(crate::Error::InvalidContainerType(other.to_string())),
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of entity a membership edge points at.
///
/// Derived at insertion time by probing container existence, never stored
/// redundantly elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Container,
    Resource,
}

impl MemberType {
    /// Stable string form used in the relational index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Resource => "resource",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "container" => Ok(Self::Container),
            "resource" => Ok(Self::Resource),
            other => Err(crate::Error::InvalidMemberType(other.to_string())),
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named collection of resources with an optional parent.
///
/// A container is itself a resource: it carries its own content bytes,
/// content type, checksum, and tags alongside the collection attributes.
/// `members` is an ordered set: insertion order is preserved and duplicates
/// are rejected by `add_member`.
#[derive(Clone, Debug)]
pub struct Container {
    pub id: String,
    /// Parent container ID; `None` for roots.
    pub parent_id: Option<String>,
    pub container_type: ContainerType,
    pub title: String,
    pub description: String,
    pub members: Vec<String>,
    /// MIME type of the container's own content.
    pub content_type: String,
    /// The container's own content bytes.
    pub data: Bytes,
    /// Digest of `data` recorded at the last successful store; `None` for a
    /// container that has never been persisted.
    pub checksum: Option<ContentHash>,
    pub tags: BTreeMap<String, String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Container {
    /// Create a new empty container.
    pub fn new(id: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            parent_id: None,
            container_type: ContainerType::Basic,
            title: String::new(),
            description: String::new(),
            members: Vec::new(),
            content_type: "application/octet-stream".to_string(),
            data: Bytes::new(),
            checksum: None,
            tags: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the parent container.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the container type.
    pub fn with_type(mut self, container_type: ContainerType) -> Self {
        self.container_type = container_type;
        self
    }

    /// Set the container's own content.
    pub fn with_content(mut self, content_type: impl Into<String>, data: Bytes) -> Self {
        self.content_type = content_type.into();
        self.data = data;
        self
    }

    /// Attach a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Size of the container's own content in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Add a member ID, preserving insertion order. Returns `false` if the
    /// member was already present.
    pub fn add_member(&mut self, member_id: impl Into<String>) -> bool {
        let member_id = member_id.into();
        if self.members.iter().any(|m| *m == member_id) {
            return false;
        }
        self.members.push(member_id);
        true
    }

    /// Remove a member ID. Returns `false` if the member was not present.
    pub fn remove_member(&mut self, member_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != member_id);
        self.members.len() != before
    }

    /// Whether the container currently lists the given member.
    pub fn has_member(&self, member_id: &str) -> bool {
        self.members.iter().any(|m| m == member_id)
    }

    /// Validate the container for storage.
    pub fn validate(&self) -> crate::Result<()> {
        if self.id.is_empty() {
            return Err(crate::Error::InvalidId("container ID is empty".to_string()));
        }
        if self.parent_id.as_deref() == Some("") {
            return Err(crate::Error::InvalidId(
                "parent ID must be absent, not empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_member_preserves_order_and_uniqueness() {
        let mut c = Container::new("c1");
        assert!(c.add_member("a"));
        assert!(c.add_member("b"));
        assert!(!c.add_member("a"));
        assert_eq!(c.members, vec!["a", "b"]);
    }

    #[test]
    fn test_remove_member() {
        let mut c = Container::new("c1");
        c.add_member("a");
        assert!(c.remove_member("a"));
        assert!(!c.remove_member("a"));
        assert!(c.members.is_empty());
    }

    #[test]
    fn test_member_type_roundtrip() {
        assert_eq!(
            MemberType::parse(MemberType::Container.as_str()).unwrap(),
            MemberType::Container
        );
        assert!(MemberType::parse("folder").is_err());
    }

    #[test]
    fn test_with_content_sets_resource_attributes() {
        let c = Container::new("c1")
            .with_content("text/turtle", Bytes::from_static(b"<a> <b> <c> ."))
            .with_tag("lang", "ttl");
        assert_eq!(c.content_type, "text/turtle");
        assert_eq!(c.size(), 13);
        assert!(c.checksum.is_none());
        assert_eq!(c.tags.get("lang").map(String::as_str), Some("ttl"));
    }

    #[test]
    fn test_validate_rejects_empty_parent() {
        let mut c = Container::new("c1");
        c.parent_id = Some(String::new());
        assert!(c.validate().is_err());
    }
}
