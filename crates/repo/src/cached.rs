//! Cache-aside wrappers for the resource store and container repository.
//!
//! Both wrappers delegate every operation to the inner implementation and
//! keep a [`BoundedCache`] coherent around it: reads fill the cache,
//! mutations invalidate the affected key after the inner call succeeds.
//! Streaming paths bypass the cache entirely; buffering a stream to cache
//! it would defeat its bounded-memory purpose.

use crate::container::ContainerRepository;
use crate::error::RepoResult;
use async_trait::async_trait;
use strata_cache::BoundedCache;
use strata_core::config::CacheConfig;
use strata_core::{Container, Pagination, Resource};
use strata_index::{MemberFilter, MemberSort, MembershipRow};
use strata_storage::{ByteStream, ResourceMeta, ResourceStore, StorageResult};

/// [`ResourceStore`] wrapper with a bounded read cache.
pub struct CachedResourceStore<S: ResourceStore> {
    inner: S,
    cache: BoundedCache<Resource>,
}

impl<S: ResourceStore> CachedResourceStore<S> {
    /// Wrap a store with a cache of the given configuration.
    pub fn new(inner: S, config: CacheConfig) -> Self {
        Self {
            inner,
            cache: BoundedCache::new(config),
        }
    }

    /// The underlying cache, for stats and manual invalidation.
    pub fn cache(&self) -> &BoundedCache<Resource> {
        &self.cache
    }
}

#[async_trait]
impl<S: ResourceStore> ResourceStore for CachedResourceStore<S> {
    async fn store(&self, resource: &Resource) -> StorageResult<ResourceMeta> {
        let meta = self.inner.store(resource).await?;
        self.cache.invalidate(&resource.id);
        Ok(meta)
    }

    async fn retrieve(&self, id: &str) -> StorageResult<Resource> {
        if let Some(resource) = self.cache.get(id) {
            return Ok(resource);
        }
        let resource = self.inner.retrieve(id).await?;
        self.cache.put(resource.clone());
        Ok(resource)
    }

    async fn retrieve_meta(&self, id: &str) -> StorageResult<ResourceMeta> {
        self.inner.retrieve_meta(id).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.inner.delete(id).await?;
        self.cache.invalidate(id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        self.inner.exists(id).await
    }

    async fn store_stream(
        &self,
        id: &str,
        content_type: &str,
        stream: ByteStream,
    ) -> StorageResult<ResourceMeta> {
        let meta = self.inner.store_stream(id, content_type, stream).await?;
        self.cache.invalidate(id);
        Ok(meta)
    }

    async fn retrieve_stream(&self, id: &str) -> StorageResult<(ResourceMeta, ByteStream)> {
        self.inner.retrieve_stream(id).await
    }
}

/// [`ContainerRepository`] wrapper with a bounded read cache.
pub struct CachedContainerRepository<R: ContainerRepository> {
    inner: R,
    cache: BoundedCache<Container>,
}

impl<R: ContainerRepository> CachedContainerRepository<R> {
    /// Wrap a repository with a cache of the given configuration.
    pub fn new(inner: R, config: CacheConfig) -> Self {
        Self {
            inner,
            cache: BoundedCache::new(config),
        }
    }

    /// The underlying cache, for stats and manual invalidation.
    pub fn cache(&self) -> &BoundedCache<Container> {
        &self.cache
    }
}

#[async_trait]
impl<R: ContainerRepository> ContainerRepository for CachedContainerRepository<R> {
    async fn create_container(&self, container: &Container) -> RepoResult<Container> {
        let created = self.inner.create_container(container).await?;
        self.cache.invalidate(&created.id);
        if let Some(parent_id) = &created.parent_id {
            self.cache.invalidate(parent_id);
        }
        Ok(created)
    }

    async fn get_container(&self, id: &str) -> RepoResult<Container> {
        if let Some(container) = self.cache.get(id) {
            return Ok(container);
        }
        let container = self.inner.get_container(id).await?;
        self.cache.put(container.clone());
        Ok(container)
    }

    async fn update_container(&self, container: &Container) -> RepoResult<Container> {
        let updated = self.inner.update_container(container).await?;
        self.cache.invalidate(&updated.id);
        Ok(updated)
    }

    async fn delete_container(&self, id: &str) -> RepoResult<()> {
        self.inner.delete_container(id).await?;
        self.cache.invalidate(id);
        Ok(())
    }

    async fn container_exists(&self, id: &str) -> RepoResult<bool> {
        self.inner.container_exists(id).await
    }

    async fn add_member(&self, container_id: &str, member_id: &str) -> RepoResult<()> {
        self.inner.add_member(container_id, member_id).await?;
        self.cache.invalidate(container_id);
        Ok(())
    }

    async fn remove_member(&self, container_id: &str, member_id: &str) -> RepoResult<()> {
        self.inner.remove_member(container_id, member_id).await?;
        self.cache.invalidate(container_id);
        Ok(())
    }

    async fn list_members(
        &self,
        container_id: &str,
        page: &Pagination,
    ) -> RepoResult<Vec<MembershipRow>> {
        self.inner.list_members(container_id, page).await
    }

    async fn list_members_filtered(
        &self,
        container_id: &str,
        page: &Pagination,
        filter: &MemberFilter,
        sort: &MemberSort,
    ) -> RepoResult<Vec<MembershipRow>> {
        self.inner
            .list_members_filtered(container_id, page, filter, sort)
            .await
    }

    async fn member_count(&self, container_id: &str) -> RepoResult<u64> {
        self.inner.member_count(container_id).await
    }

    async fn get_children(&self, id: &str) -> RepoResult<Vec<Container>> {
        self.inner.get_children(id).await
    }

    async fn get_parent(&self, id: &str) -> RepoResult<Option<Container>> {
        self.inner.get_parent(id).await
    }

    async fn get_path(&self, id: &str) -> RepoResult<Vec<String>> {
        self.inner.get_path(id).await
    }

    async fn find_by_path(&self, path: &str) -> RepoResult<Container> {
        self.inner.find_by_path(path).await
    }
}
