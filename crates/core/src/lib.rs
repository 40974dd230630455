//! Core domain types and shared logic for the strata storage engine.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Resource blobs and their SHA-256 checksums
//! - Containers and containment relationships
//! - Pagination and member typing
//! - Configuration for the storage, index, and cache layers

pub mod config;
pub mod container;
pub mod error;
pub mod hash;
pub mod resource;

pub use config::{CacheConfig, IndexConfig, StorageConfig};
pub use container::{Container, ContainerType, MemberType};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use resource::{Pagination, Resource};
