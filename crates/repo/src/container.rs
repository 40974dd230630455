//! Container repository over the resource store, document store, and
//! membership index.

use crate::documents::{ContainerDoc, ContainerDocStore};
use crate::error::{RepoError, RepoResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use strata_core::{Container, ContentHash, Pagination, Resource};
use strata_index::{
    ContainerRow, IndexError, MemberFilter, MemberSort, MembershipIndex, MembershipRow,
};
use strata_storage::{ChecksumStore, ResourceStore};
use time::OffsetDateTime;
use tracing::instrument;

/// Hierarchical container repository.
///
/// A container is stored as a resource plus a sidecar document in the same
/// directory: its content bytes go through the checksummed store, and the
/// collection attributes live in `container.json`. The filesystem is
/// authoritative; the membership index is a derived projection. Mutations
/// persist the files first and touch the index last, so a crash between the
/// two leaves the files ahead of the index, which a rescan can repair.
#[async_trait]
pub trait ContainerRepository: Send + Sync + 'static {
    /// Create a container. Fails with `AlreadyExists` when the ID is taken
    /// and `NotFound` when a named parent does not exist.
    async fn create_container(&self, container: &Container) -> RepoResult<Container>;

    /// Load a container: the verified content bytes merged with the
    /// collection document.
    async fn get_container(&self, id: &str) -> RepoResult<Container>;

    /// Replace an existing container's content and document.
    async fn update_container(&self, container: &Container) -> RepoResult<Container>;

    /// Delete an empty container. Fails with `ContainerNotEmpty` otherwise.
    async fn delete_container(&self, id: &str) -> RepoResult<()>;

    /// Pure existence probe for the container document.
    async fn container_exists(&self, id: &str) -> RepoResult<bool>;

    /// Add a member to a container. Adding a member that is already present
    /// is a no-op.
    async fn add_member(&self, container_id: &str, member_id: &str) -> RepoResult<()>;

    /// Remove a member. Fails with `MembershipNotFound` when the member is
    /// not present; removal is never a silent no-op.
    async fn remove_member(&self, container_id: &str, member_id: &str) -> RepoResult<()>;

    /// Page through a container's members in insertion order.
    async fn list_members(
        &self,
        container_id: &str,
        page: &Pagination,
    ) -> RepoResult<Vec<MembershipRow>>;

    /// Page through members with filtering and sorting applied before
    /// pagination.
    async fn list_members_filtered(
        &self,
        container_id: &str,
        page: &Pagination,
        filter: &MemberFilter,
        sort: &MemberSort,
    ) -> RepoResult<Vec<MembershipRow>>;

    /// Total member count, ignoring pagination.
    async fn member_count(&self, container_id: &str) -> RepoResult<u64>;

    /// Direct child containers only; no recursion.
    async fn get_children(&self, id: &str) -> RepoResult<Vec<Container>>;

    /// The container's parent, or `None` for roots.
    async fn get_parent(&self, id: &str) -> RepoResult<Option<Container>>;

    /// Root-to-node chain of container IDs. A missing ancestor or a parent
    /// cycle is an error.
    async fn get_path(&self, id: &str) -> RepoResult<Vec<String>>;

    /// Resolve a `/`-separated ID chain from a root container, verifying
    /// each hop's parent linkage.
    async fn find_by_path(&self, path: &str) -> RepoResult<Container>;
}

/// Filesystem-backed container repository.
pub struct FsContainerRepository {
    store: ChecksumStore,
    docs: ContainerDocStore,
    index: Arc<dyn MembershipIndex>,
}

impl FsContainerRepository {
    /// Open a repository over a containers directory and a membership index.
    /// The resource store and document store share the directory, so each
    /// container occupies one subdirectory holding content, metadata, and
    /// document.
    pub async fn new(
        containers_dir: impl AsRef<Path>,
        index: Arc<dyn MembershipIndex>,
    ) -> RepoResult<Self> {
        let store = ChecksumStore::new(containers_dir.as_ref()).await?;
        let docs = ContainerDocStore::new(containers_dir).await?;
        Ok(Self { store, docs, index })
    }

    fn container_row(container: &Container) -> ContainerRow {
        ContainerRow {
            id: container.id.clone(),
            parent_id: container.parent_id.clone(),
            container_type: container.container_type,
            title: container.title.clone(),
            description: container.description.clone(),
            created_at: container.created_at,
            updated_at: container.updated_at,
        }
    }

    /// The resource view of a container: what goes through the checksummed
    /// store.
    fn resource_half(container: &Container) -> Resource {
        Resource {
            id: container.id.clone(),
            content_type: container.content_type.clone(),
            data: container.data.clone(),
            checksum: None,
            created_at: container.created_at,
            updated_at: container.updated_at,
            tags: container.tags.clone(),
        }
    }

    /// Reassemble a container from its two persisted halves. The document
    /// supplies the collection attributes and timestamps, the resource the
    /// verified content.
    fn merge(doc: ContainerDoc, resource: Resource) -> Container {
        Container {
            id: doc.id,
            parent_id: doc.parent_id,
            container_type: doc.container_type,
            title: doc.title,
            description: doc.description,
            members: doc.members,
            content_type: resource.content_type,
            data: resource.data,
            checksum: resource.checksum,
            tags: resource.tags,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }

    /// Store the content bytes and return the recorded checksum.
    async fn store_content(&self, container: &Container) -> RepoResult<ContentHash> {
        let meta = self.store.store(&Self::resource_half(container)).await?;
        ContentHash::from_hex(&meta.checksum).map_err(|e| RepoError::Serialization(e.to_string()))
    }

    /// Register a freshly created container in the index: its row, the edge
    /// from its parent, and an edge for each pre-populated member.
    async fn index_new_container(&self, container: &Container) -> RepoResult<()> {
        self.index
            .upsert_container(&Self::container_row(container))
            .await?;
        if let Some(parent_id) = &container.parent_id {
            self.index
                .index_membership(parent_id, &container.id)
                .await?;
        }
        for member_id in &container.members {
            self.index.index_membership(&container.id, member_id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRepository for FsContainerRepository {
    #[instrument(skip(self, container), fields(id = %container.id))]
    async fn create_container(&self, container: &Container) -> RepoResult<Container> {
        container
            .validate()
            .map_err(|e| RepoError::InvalidContainer(e.to_string()))?;
        if self.docs.exists(&container.id).await? {
            return Err(RepoError::AlreadyExists(container.id.clone()));
        }
        if let Some(parent_id) = &container.parent_id {
            if !self.docs.exists(parent_id).await? {
                return Err(RepoError::NotFound(format!("parent container {parent_id}")));
            }
        }

        let mut stored = container.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        stored.checksum = Some(self.store_content(&stored).await?);
        self.docs.write(&ContainerDoc::from_container(&stored)).await?;

        // The container exists on disk from here on; indexing failures must
        // not leave it behind. Cleanup errors are logged, never surfaced
        // over the original failure.
        if let Err(e) = self.index_new_container(&stored).await {
            self.docs.delete_best_effort(&stored.id).await;
            return Err(e);
        }
        Ok(stored)
    }

    async fn get_container(&self, id: &str) -> RepoResult<Container> {
        let doc = self.docs.read(id).await?;
        let resource = self.store.retrieve(id).await?;
        Ok(Self::merge(doc, resource))
    }

    #[instrument(skip(self, container), fields(id = %container.id))]
    async fn update_container(&self, container: &Container) -> RepoResult<Container> {
        container
            .validate()
            .map_err(|e| RepoError::InvalidContainer(e.to_string()))?;
        let existing = self.docs.read(&container.id).await?;

        let mut stored = container.clone();
        stored.created_at = existing.created_at;
        stored.updated_at = OffsetDateTime::now_utc();
        stored.checksum = Some(self.store_content(&stored).await?);
        self.docs.write(&ContainerDoc::from_container(&stored)).await?;
        self.index
            .upsert_container(&Self::container_row(&stored))
            .await?;
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn delete_container(&self, id: &str) -> RepoResult<()> {
        if !self.docs.exists(id).await? {
            return Err(RepoError::NotFound(format!("container {id}")));
        }
        let members = self.list_members(id, &Pagination::new(1, 0)).await?;
        if !members.is_empty() {
            return Err(RepoError::ContainerNotEmpty(id.to_string()));
        }

        self.docs.delete(id).await?;
        match self.index.delete_container_record(id).await {
            Ok(()) => Ok(()),
            // The document is already gone; a missing index row is the
            // desired end state, not a failure.
            Err(IndexError::NotFound(_)) => {
                tracing::warn!(id = id, "container was absent from the index on delete");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn container_exists(&self, id: &str) -> RepoResult<bool> {
        self.docs.exists(id).await
    }

    #[instrument(skip(self))]
    async fn add_member(&self, container_id: &str, member_id: &str) -> RepoResult<()> {
        let mut doc = self.docs.read(container_id).await?;
        if doc.members.iter().any(|m| m == member_id) {
            return Ok(());
        }
        doc.members.push(member_id.to_string());
        doc.updated_at = OffsetDateTime::now_utc();
        self.docs.write(&doc).await?;
        self.index.index_membership(container_id, member_id).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, container_id: &str, member_id: &str) -> RepoResult<()> {
        let mut doc = self.docs.read(container_id).await?;
        let before = doc.members.len();
        doc.members.retain(|m| m != member_id);
        if doc.members.len() == before {
            return Err(RepoError::MembershipNotFound {
                container_id: container_id.to_string(),
                member_id: member_id.to_string(),
            });
        }
        doc.updated_at = OffsetDateTime::now_utc();
        self.docs.write(&doc).await?;
        match self.index.remove_membership(container_id, member_id).await {
            Ok(()) => Ok(()),
            Err(IndexError::NotFound(_)) => Err(RepoError::MembershipNotFound {
                container_id: container_id.to_string(),
                member_id: member_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_members(
        &self,
        container_id: &str,
        page: &Pagination,
    ) -> RepoResult<Vec<MembershipRow>> {
        Ok(self.index.get_members(container_id, page).await?)
    }

    async fn list_members_filtered(
        &self,
        container_id: &str,
        page: &Pagination,
        filter: &MemberFilter,
        sort: &MemberSort,
    ) -> RepoResult<Vec<MembershipRow>> {
        Ok(self
            .index
            .get_members_filtered(container_id, page, filter, sort)
            .await?)
    }

    async fn member_count(&self, container_id: &str) -> RepoResult<u64> {
        Ok(self.index.get_member_count(container_id).await?)
    }

    async fn get_children(&self, id: &str) -> RepoResult<Vec<Container>> {
        let rows = self.index.get_children(id).await?;
        let mut children = Vec::with_capacity(rows.len());
        for row in rows {
            children.push(self.get_container(&row.id).await?);
        }
        Ok(children)
    }

    async fn get_parent(&self, id: &str) -> RepoResult<Option<Container>> {
        let doc = self.docs.read(id).await?;
        match doc.parent_id {
            Some(parent_id) => Ok(Some(self.get_container(&parent_id).await?)),
            None => Ok(None),
        }
    }

    async fn get_path(&self, id: &str) -> RepoResult<Vec<String>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        // Ancestry only needs the documents, not the content bytes.
        let mut current = self.docs.read(id).await?;
        loop {
            if !seen.insert(current.id.clone()) {
                return Err(RepoError::InvalidContainer(format!(
                    "parent cycle detected at {}",
                    current.id
                )));
            }
            chain.push(current.id.clone());
            match &current.parent_id {
                Some(parent_id) => current = self.docs.read(parent_id).await?,
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    async fn find_by_path(&self, path: &str) -> RepoResult<Container> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let root_id = segments
            .next()
            .ok_or_else(|| RepoError::InvalidId("empty path".to_string()))?;

        let mut current = self.docs.read(root_id).await?;
        if current.parent_id.is_some() {
            return Err(RepoError::NotFound(format!(
                "{root_id} is not a root container"
            )));
        }
        for segment in segments {
            let next = self.docs.read(segment).await?;
            if next.parent_id.as_deref() != Some(current.id.as_str()) {
                return Err(RepoError::NotFound(format!(
                    "{segment} is not a child of {}",
                    current.id
                )));
            }
            current = next;
        }
        self.get_container(&current.id).await
    }
}
