//! Metadata registry
//!
//! Per-type cache of resolved `EntityMetadata`.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::{Entity, EntityMapping, EntityMetadata, MappedType};
use crate::error::{OmError, Result};

static GLOBAL: OnceLock<Arc<MetadataRegistry>> = OnceLock::new();

/// Resolves and caches entity metadata
///
/// ## Concurrency:
/// - Warm lookups take the read lock only
/// - A type's first resolution builds under the write lock and re-checks
///   the cache first, so each type is built exactly once even when many
///   threads race on first access
/// - Failed resolutions are not cached
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    /// Resolved metadata keyed by Rust type
    cache: RwLock<HashMap<TypeId, Arc<EntityMetadata>>>,

    /// Number of successful metadata builds (for diagnostics)
    builds: AtomicUsize,
}

impl MetadataRegistry {
    /// Create an empty, isolated registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use
    pub fn global() -> Arc<MetadataRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(MetadataRegistry::new())))
    }

    /// Resolve metadata for `E`
    ///
    /// Fails with `UnmappedEntity` when `E` declares no mapping and with
    /// `InvalidMapping` when its declaration does not validate.
    pub fn resolve<E: Entity>(&self) -> Result<Arc<EntityMetadata>> {
        self.resolve_with(TypeId::of::<E>(), std::any::type_name::<E>(), E::mapping)
    }

    /// Resolve metadata for a registered type descriptor
    pub fn resolve_mapped(&self, mapped: &MappedType) -> Result<Arc<EntityMetadata>> {
        self.resolve_with(mapped.type_id(), mapped.rust_name(), || mapped.mapping())
    }

    fn resolve_with(
        &self,
        type_id: TypeId,
        rust_name: &str,
        declare: impl FnOnce() -> Option<EntityMapping>,
    ) -> Result<Arc<EntityMetadata>> {
        if let Some(metadata) = self.cache.read().get(&type_id) {
            return Ok(Arc::clone(metadata));
        }

        let mut cache = self.cache.write();
        if let Some(metadata) = cache.get(&type_id) {
            return Ok(Arc::clone(metadata));
        }

        let mapping = declare().ok_or_else(|| OmError::UnmappedEntity {
            type_name: rust_name.to_string(),
        })?;
        let metadata = EntityMetadata::from_mapping(mapping)?;

        if let Some(other) = cache
            .values()
            .find(|m| m.key_prefix() == metadata.key_prefix())
        {
            return Err(OmError::InvalidMapping(format!(
                "{}: key prefix '{}' already used by {}",
                metadata.type_name(),
                metadata.key_prefix(),
                other.type_name()
            )));
        }

        tracing::debug!(
            "Resolved metadata for {} (prefix '{}', {} fields, ttl {:?})",
            metadata.type_name(),
            metadata.key_prefix(),
            metadata.fields().len(),
            metadata.ttl()
        );

        let metadata = Arc::new(metadata);
        cache.insert(type_id, Arc::clone(&metadata));
        self.builds.fetch_add(1, Ordering::Relaxed);
        Ok(metadata)
    }

    /// Whether metadata for `E` has been resolved
    pub fn contains<E: Entity>(&self) -> bool {
        self.cache.read().contains_key(&TypeId::of::<E>())
    }

    /// Number of resolved types
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of metadata builds performed so far
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}
