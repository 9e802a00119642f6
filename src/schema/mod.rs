//! Schema Module
//!
//! Setup-time runner that prepares the store for index queries.
//!
//! ## Responsibilities
//! - Write one schema marker per mapped type, so lookups against an index
//!   that has no members yet return empty instead of `IndexMissing`
//! - Repair corrupted or outdated markers; leave identical ones untouched
//! - Sweep index members that no longer match a stored record
//!
//! Nothing here deletes record or index data, so every operation is safe to
//! run repeatedly and alongside live object managers.

mod definition;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::KvClient;
use crate::config::KeyLayout;
use crate::error::Result;
use crate::hydrator::EntityRecord;
use crate::index::IndexBuilder;
use crate::metadata::{mapped_types_in, Entity, EntityMetadata, MappedType, MetadataRegistry};

pub use definition::{IndexDefinition, SchemaDefinition, SCHEMA_VERSION};

/// Outcome of a schema run, by entity type name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
}

impl SchemaReport {
    /// Number of types processed
    pub fn total(&self) -> usize {
        self.created.len() + self.updated.len() + self.unchanged.len()
    }

    fn merge(&mut self, other: SchemaReport) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.unchanged.extend(other.unchanged);
    }
}

/// What happened to one marker
enum MarkerStatus {
    Created,
    Updated,
    Unchanged,
}

/// Writes schema markers and maintains index sets
pub struct SchemaGenerator<C: KvClient> {
    client: C,
    registry: Arc<MetadataRegistry>,
    layout: KeyLayout,
}

impl<C: KvClient> SchemaGenerator<C> {
    /// Schema generator using the process-wide metadata registry
    pub fn new(client: C) -> Self {
        Self::with_registry(client, MetadataRegistry::global())
    }

    pub fn with_registry(client: C, registry: Arc<MetadataRegistry>) -> Self {
        Self {
            client,
            registry,
            layout: KeyLayout::default(),
        }
    }

    /// Use a non-default key layout
    pub fn with_layout(mut self, layout: KeyLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Ensure a schema marker exists for every given type
    ///
    /// Stops at the first type whose mapping does not resolve.
    pub fn generate_schema(&self, types: &[&MappedType]) -> Result<SchemaReport> {
        let mut report = SchemaReport::default();
        for mapped in types {
            let metadata = self.registry.resolve_mapped(mapped)?;
            report.merge(self.ensure(&metadata)?);
        }

        tracing::info!(
            "Schema run: {} created, {} updated, {} unchanged",
            report.created.len(),
            report.updated.len(),
            report.unchanged.len()
        );
        Ok(report)
    }

    /// Ensure a schema marker exists for every type registered under `scope`
    pub fn generate_schema_for_scope(&self, scope: &str) -> Result<SchemaReport> {
        let types = mapped_types_in(scope);
        if types.is_empty() {
            tracing::warn!("No mapped types registered under scope '{}'", scope);
        }
        self.generate_schema(&types)
    }

    /// Ensure the schema marker for `E` exists
    pub fn generate_for<E: Entity>(&self) -> Result<SchemaReport> {
        let metadata = self.registry.resolve::<E>()?;
        self.ensure(&metadata)
    }

    fn ensure(&self, metadata: &EntityMetadata) -> Result<SchemaReport> {
        self.layout.check_prefix(metadata.key_prefix())?;
        let key = self.layout.schema_key(metadata.key_prefix());
        let wanted = SchemaDefinition::from_metadata(metadata);
        let stored = self.client.hash_get_all(&key)?;

        let status = if stored.is_empty() {
            self.write_marker(&key, &wanted, &stored)?;
            MarkerStatus::Created
        } else if wanted.is_encoded_in(&stored) {
            MarkerStatus::Unchanged
        } else {
            match SchemaDefinition::decode(&key, &stored) {
                Ok(previous) => tracing::debug!(
                    "Schema marker {} outdated (version {}, {} indexes)",
                    key,
                    previous.version,
                    previous.indexes.len()
                ),
                Err(e) => tracing::warn!("Repairing schema marker {}: {}", key, e),
            }
            self.write_marker(&key, &wanted, &stored)?;
            MarkerStatus::Updated
        };

        let name = metadata.type_name().to_string();
        let mut report = SchemaReport::default();
        match status {
            MarkerStatus::Created => {
                tracing::debug!("Created schema marker {}", key);
                report.created.push(name);
            }
            MarkerStatus::Updated => report.updated.push(name),
            MarkerStatus::Unchanged => report.unchanged.push(name),
        }
        Ok(report)
    }

    fn write_marker(
        &self,
        key: &str,
        definition: &SchemaDefinition,
        stored: &BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let fields = definition.encode()?;
        self.client.hash_set_all(key, &fields)?;

        let stray: Vec<String> = stored
            .keys()
            .filter(|f| !fields.contains_key(*f))
            .cloned()
            .collect();
        if !stray.is_empty() {
            self.client.hash_delete(key, &stray)?;
        }
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Stored schema definition for a key prefix, if any
    pub fn read_definition(&self, prefix: &str) -> Result<Option<SchemaDefinition>> {
        let key = self.layout.schema_key(prefix);
        let stored = self.client.hash_get_all(&key)?;
        if stored.is_empty() {
            return Ok(None);
        }
        SchemaDefinition::decode(&key, &stored).map(Some)
    }

    /// Every readable schema marker in the store, by prefix
    ///
    /// Markers that fail to decode are skipped with a warning.
    pub fn list_schemas(&self) -> Result<Vec<SchemaDefinition>> {
        let mut definitions = Vec::new();
        for key in self.client.scan(&self.layout.schema_pattern())? {
            let stored = self.client.hash_get_all(&key)?;
            if stored.is_empty() {
                continue;
            }
            match SchemaDefinition::decode(&key, &stored) {
                Ok(definition) => definitions.push(definition),
                Err(e) => tracing::warn!("Skipping schema marker {}: {}", key, e),
            }
        }
        definitions.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        Ok(definitions)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove index members of `E` that no longer match a stored record
    ///
    /// A member is stale when its record is gone (expired, or deleted by a
    /// flush that failed before retracting its indexes) or when the record
    /// no longer carries the indexed value. Returns the number removed.
    pub fn sweep_orphans<E: Entity>(&self) -> Result<usize> {
        let metadata = self.registry.resolve::<E>()?;
        self.layout.check_prefix(metadata.key_prefix())?;
        let indexes = IndexBuilder::new(self.layout.clone());
        let mut removed = 0;

        for index_key in self.client.scan(&self.layout.index_pattern(metadata.key_prefix()))? {
            for member in self.client.set_members(&index_key)? {
                if !self.is_current(&indexes, &metadata, &index_key, &member)?
                    && self.client.set_remove(&index_key, &member)?
                {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            tracing::info!(
                "Swept {} stale index members of {}",
                removed,
                metadata.type_name()
            );
        }
        Ok(removed)
    }

    fn is_current(
        &self,
        indexes: &IndexBuilder,
        metadata: &EntityMetadata,
        index_key: &str,
        member: &str,
    ) -> Result<bool> {
        if KeyLayout::identity_of(metadata.key_prefix(), member).is_none() {
            return Ok(false);
        }
        let stored = self.client.hash_get_all(member)?;
        if stored.is_empty() {
            return Ok(false);
        }

        let record = EntityRecord::new(member, stored);
        indexes.requires_entry(&record, metadata, index_key)
    }
}
