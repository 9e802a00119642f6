//! Object Manager Module
//!
//! The unit of work: tracks entities, stages changes and flushes them.
//!
//! ## Responsibilities
//! - Track entity state per primary key (identity map)
//! - Stage persist/remove calls in insertion order
//! - Flush staged entries, collecting per-entity failures
//! - Load entities and answer index lookups
//!
//! ## Consistency
//! A flush touches a record and several index sets with separate atomic
//! store calls. Concurrent readers may observe a record whose indexes are
//! not yet updated: the store is eventually consistent within a flush.
//! Concurrent writers to the same entity resolve last-write-wins.

mod flush;
mod state;

use std::collections::HashMap;
use std::sync::Arc;

use crate::client::KvClient;
use crate::config::KeyLayout;
use crate::error::{EntityFailure, FlushError, OmError, Result};
use crate::hydrator::{encoding::encode_scalar, hydrate, primary_key, EntityRecord};
use crate::index::IndexBuilder;
use crate::metadata::{Entity, EntityMetadata, IndexPolicy, MetadataRegistry, Value};

pub use flush::FlushReport;
pub use state::{EntityState, Operation};

use flush::flush_entry;
use state::Tracked;

/// Unit of work over a `KvClient`
///
/// Entities are held by value: `persist` and `remove` take a copy of the
/// entity as it is at call time. Changes made afterwards are only seen
/// after persisting again.
///
/// ## Concurrency:
/// - One `ObjectManager` per request/thread; it is not shared
/// - Many managers may run against the same store without coordination
pub struct ObjectManager<C: KvClient> {
    client: C,
    registry: Arc<MetadataRegistry>,
    indexes: IndexBuilder,

    /// Tracked entities keyed by primary key
    tracked: HashMap<String, Tracked>,

    /// Staged primary keys, in first-staged order
    queue: Vec<String>,
}

impl<C: KvClient> ObjectManager<C> {
    /// Object manager using the process-wide metadata registry
    pub fn new(client: C) -> Self {
        Self::with_registry(client, MetadataRegistry::global())
    }

    /// Object manager using a dedicated metadata registry
    pub fn with_registry(client: C, registry: Arc<MetadataRegistry>) -> Self {
        Self {
            client,
            registry,
            indexes: IndexBuilder::default(),
            tracked: HashMap::new(),
            queue: Vec::new(),
        }
    }

    /// Use a non-default key layout
    pub fn with_layout(mut self, layout: KeyLayout) -> Self {
        self.indexes = IndexBuilder::new(layout);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    // =========================================================================
    // Staging
    // =========================================================================

    /// Stage an insert or update of `entity`
    ///
    /// The first persist of an untracked entity reads its stored record (if
    /// any) as the snapshot later flushes diff against, and leaves it
    /// `Managed`. Persisting it again while that first change is still
    /// staged only refreshes the staged copy and keeps it `Managed`; the
    /// entity becomes `Dirty` once it is re-persisted after a load or flush.
    pub fn persist<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let metadata = self.metadata::<E>()?;
        let key = primary_key(entity, &metadata)?;

        match self.tracked.get_mut(&key) {
            Some(tracked) => {
                tracked.entity = Box::new(entity.clone());
                tracked.state = match tracked.state {
                    EntityState::New => EntityState::Managed,
                    EntityState::Managed if !self.queue.contains(&key) => EntityState::Dirty,
                    EntityState::Managed => EntityState::Managed,
                    _ => EntityState::Dirty,
                };
            }
            None => {
                let stored = self.client.hash_get_all(&key)?;
                let snapshot = (!stored.is_empty()).then(|| EntityRecord::new(key.clone(), stored));
                self.tracked.insert(
                    key.clone(),
                    Tracked {
                        metadata,
                        entity: Box::new(entity.clone()),
                        state: EntityState::Managed,
                        snapshot,
                    },
                );
            }
        }

        self.stage(key);
        Ok(())
    }

    /// Stage the deletion of `entity`
    ///
    /// Fails with `NotManaged` unless the entity was persisted or loaded
    /// through this manager. Removing an entity that was never stored
    /// cancels its pending insert. An insert whose flush failed partway may
    /// have left a record behind, so the store is checked first and
    /// whatever it holds is deleted along with its index entries.
    pub fn remove<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let metadata = self.metadata::<E>()?;
        let key = primary_key(entity, &metadata)?;

        let Some(tracked) = self.tracked.get_mut(&key) else {
            return Err(OmError::NotManaged { key });
        };

        if tracked.snapshot.is_none() {
            let stored = self.client.hash_get_all(&key)?;
            if stored.is_empty() {
                self.tracked.remove(&key);
                self.queue.retain(|k| k != &key);
                return Ok(());
            }
            tracing::debug!("{} was partially written, staging its deletion", key);
            tracked.snapshot = Some(EntityRecord::new(key.clone(), stored));
        }

        tracked.entity = Box::new(entity.clone());
        tracked.state = EntityState::Removed;
        self.stage(key);
        Ok(())
    }

    fn stage(&mut self, key: String) {
        if !self.queue.contains(&key) {
            self.queue.push(key);
        }
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Write every staged change to the store, in staging order
    ///
    /// A failing entity does not stop the others. Its staged change and
    /// snapshot stay exactly as before the call, so a later flush retries
    /// it. If any entity failed, the call returns `OmError::Flush` listing
    /// both the succeeded and the failed primary keys.
    pub fn flush(&mut self) -> Result<FlushReport> {
        let queue = std::mem::take(&mut self.queue);
        let mut succeeded = Vec::with_capacity(queue.len());
        let mut failed = Vec::new();

        for key in queue {
            let Some(tracked) = self.tracked.get(&key) else {
                continue;
            };

            match flush_entry(&self.client, &self.indexes, &key, tracked) {
                Ok(Some(record)) => {
                    if let Some(tracked) = self.tracked.get_mut(&key) {
                        tracked.snapshot = Some(record);
                        tracked.state = EntityState::Flushed;
                    }
                    succeeded.push(key);
                }
                Ok(None) => {
                    self.tracked.remove(&key);
                    succeeded.push(key);
                }
                Err(error) => {
                    tracing::warn!("Flush of {} failed: {}", key, error);
                    failed.push(EntityFailure {
                        key: key.clone(),
                        type_name: tracked.metadata.type_name().to_string(),
                        error,
                    });
                    self.queue.push(key);
                }
            }
        }

        if failed.is_empty() {
            if !succeeded.is_empty() {
                tracing::info!("Flushed {} entities", succeeded.len());
            }
            Ok(FlushReport { flushed: succeeded })
        } else {
            tracing::warn!(
                "Flush finished with {} failures ({} succeeded)",
                failed.len(),
                succeeded.len()
            );
            Err(FlushError { succeeded, failed }.into())
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load an entity by identity (`id`, or `a:b` for composite identities)
    ///
    /// An entity with a staged change is returned as staged (`None` if
    /// staged for removal). Otherwise the store is read and the result is
    /// registered as `Managed` with the loaded record as its snapshot.
    pub fn find<E: Entity>(&mut self, id: &str) -> Result<Option<E>> {
        let metadata = self.metadata::<E>()?;
        let key = KeyLayout::record_key(metadata.key_prefix(), id);
        self.load(&key, metadata)
    }

    fn load<E: Entity>(&mut self, key: &str, metadata: Arc<EntityMetadata>) -> Result<Option<E>> {
        if self.queue.iter().any(|k| k == key) {
            if let Some(tracked) = self.tracked.get(key) {
                if tracked.state == EntityState::Removed {
                    return Ok(None);
                }
                return Ok(tracked.downcast::<E>());
            }
        }

        let stored = self.client.hash_get_all(key)?;
        if stored.is_empty() {
            // Gone from the store (deleted elsewhere or expired)
            self.tracked.remove(key);
            return Ok(None);
        }

        let record = EntityRecord::new(key, stored);
        let entity: E = hydrate(&record, &metadata)?;
        self.tracked.insert(
            key.to_string(),
            Tracked {
                metadata,
                entity: Box::new(entity.clone()),
                state: EntityState::Managed,
                snapshot: Some(record),
            },
        );
        Ok(Some(entity))
    }

    /// Identities of stored entities whose indexed `field` equals `value`
    ///
    /// Fails with `NotIndexed` for a field without an index and with
    /// `IndexMissing` when nothing matched and no schema was generated for
    /// the type. A member is only returned while its stored record still
    /// carries the value; members whose record is gone or has moved on are
    /// skipped.
    pub fn lookup_ids<E: Entity>(&self, field: &str, value: impl Into<Value>) -> Result<Vec<String>> {
        let metadata = self.metadata::<E>()?;
        let spec = metadata
            .field(field)
            .filter(|s| s.index.is_indexed())
            .ok_or_else(|| OmError::NotIndexed {
                type_name: metadata.type_name().to_string(),
                field: field.to_string(),
            })?;

        let encoded = encode_scalar(field, &spec.kind, &value.into())?.filter(|v| !v.is_empty());
        if encoded.is_none() && spec.index != IndexPolicy::IndexedNullable {
            return Ok(Vec::new());
        }

        let index_key = self
            .indexes
            .lookup_key(&metadata, field, encoded.as_deref())?;
        let members = self.client.set_members(&index_key)?;

        if members.is_empty() {
            let schema_key = self.indexes.layout().schema_key(metadata.key_prefix());
            if !self.client.exists(&schema_key)? {
                return Err(OmError::IndexMissing {
                    type_name: metadata.type_name().to_string(),
                });
            }
        }

        let mut ids = Vec::with_capacity(members.len());
        for member in &members {
            let Some(id) = KeyLayout::identity_of(metadata.key_prefix(), member) else {
                continue;
            };
            let stored = self.client.hash_get_all(member)?;
            if stored.is_empty() {
                continue;
            }
            let record = EntityRecord::new(member.as_str(), stored);
            if self.indexes.requires_entry(&record, &metadata, &index_key)? {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    /// Load every stored entity whose indexed `field` equals `value`
    pub fn find_by<E: Entity>(&mut self, field: &str, value: impl Into<Value>) -> Result<Vec<E>> {
        let ids = self.lookup_ids::<E>(field, value)?;
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.find::<E>(&id)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Load every stored entity of type `E`
    pub fn find_all<E: Entity>(&mut self) -> Result<Vec<E>> {
        let metadata = self.metadata::<E>()?;
        let keys = self
            .client
            .scan(&KeyLayout::record_pattern(metadata.key_prefix()))?;

        let mut entities = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entity) = self.load::<E>(&key, Arc::clone(&metadata))? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    // =========================================================================
    // Tracking
    // =========================================================================

    /// Current state of `entity` in this unit of work
    pub fn state_of<E: Entity>(&self, entity: &E) -> Result<EntityState> {
        let key = self.key_of(entity)?;
        Ok(self
            .tracked
            .get(&key)
            .map_or(EntityState::New, |t| t.state))
    }

    /// Operation the next flush would perform for `entity`, if staged
    pub fn staged_operation<E: Entity>(&self, entity: &E) -> Result<Option<Operation>> {
        let key = self.key_of(entity)?;
        if !self.queue.contains(&key) {
            return Ok(None);
        }
        Ok(self.tracked.get(&key).map(Tracked::operation))
    }

    pub fn is_tracked<E: Entity>(&self, entity: &E) -> Result<bool> {
        let key = self.key_of(entity)?;
        Ok(self.tracked.contains_key(&key))
    }

    /// Stop tracking `entity`, discarding any staged change
    pub fn detach<E: Entity>(&mut self, entity: &E) -> Result<bool> {
        let key = self.key_of(entity)?;
        self.queue.retain(|k| k != &key);
        Ok(self.tracked.remove(&key).is_some())
    }

    /// Stop tracking everything, discarding all staged changes
    pub fn clear(&mut self) {
        self.tracked.clear();
        self.queue.clear();
    }

    /// Number of staged entries awaiting flush
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn key_of<E: Entity>(&self, entity: &E) -> Result<String> {
        let metadata = self.metadata::<E>()?;
        primary_key(entity, &metadata)
    }

    /// Resolved metadata whose prefix fits this manager's key layout
    fn metadata<E: Entity>(&self) -> Result<Arc<EntityMetadata>> {
        let metadata = self.registry.resolve::<E>()?;
        self.indexes.layout().check_prefix(metadata.key_prefix())?;
        Ok(metadata)
    }
}
