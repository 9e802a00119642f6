//! Flush of a single staged entity
//!
//! ## Write Order
//! 1. Record hash (one atomic multi-field write)
//! 2. Drop hash fields the entity no longer carries
//! 3. Index additions
//! 4. Index removals
//! 5. Expiry
//!
//! Deletes remove the record first, then its index memberships. A failure
//! between steps leaves at worst an orphan index member pointing at a
//! missing or stale record; lookups skip those and
//! `SchemaGenerator::sweep_orphans` removes them. Every step is idempotent,
//! so re-flushing the same staged entry converges.

use std::collections::BTreeSet;

use super::state::{Operation, Tracked};
use crate::client::KvClient;
use crate::error::Result;
use crate::hydrator::EntityRecord;
use crate::index::{diff, IndexBuilder};

/// Successful flush summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Primary keys written or deleted, in flush order
    pub flushed: Vec<String>,
}

impl FlushReport {
    pub fn len(&self) -> usize {
        self.flushed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flushed.is_empty()
    }
}

/// Apply one staged entry to the store
///
/// Returns the record now stored, or `None` after a delete.
pub(crate) fn flush_entry<C: KvClient + ?Sized>(
    client: &C,
    indexes: &IndexBuilder,
    key: &str,
    tracked: &Tracked,
) -> Result<Option<EntityRecord>> {
    let metadata = &tracked.metadata;
    let operation = tracked.operation();

    if operation == Operation::Delete {
        let old_entries = match &tracked.snapshot {
            Some(snapshot) => indexes.indexes_for(snapshot, metadata)?,
            None => BTreeSet::new(),
        };

        client.delete(key)?;
        for entry in &old_entries {
            client.set_remove(&entry.index_key, &entry.member_key)?;
        }

        tracing::debug!(
            "Deleted {} ({} index entries retracted)",
            key,
            old_entries.len()
        );
        return Ok(None);
    }

    let record = tracked.entity.dehydrate(metadata)?;
    let new_entries = indexes.indexes_for(&record, metadata)?;
    let (old_entries, dropped) = match &tracked.snapshot {
        Some(snapshot) => (
            indexes.indexes_for(snapshot, metadata)?,
            snapshot.dropped_fields(&record),
        ),
        None => (BTreeSet::new(), Vec::new()),
    };
    let delta = diff(&old_entries, &new_entries);

    client.hash_set_all(&record.key, &record.fields)?;
    if !dropped.is_empty() {
        client.hash_delete(&record.key, &dropped)?;
    }
    for entry in &delta.to_add {
        client.set_add(&entry.index_key, &entry.member_key)?;
    }
    for entry in &delta.to_remove {
        client.set_remove(&entry.index_key, &entry.member_key)?;
    }
    if let Some(ttl) = metadata.ttl() {
        client.expire(&record.key, ttl)?;
    }

    tracing::debug!(
        "{:?} {} ({} fields, +{} -{} index entries)",
        operation,
        record.key,
        record.fields.len(),
        delta.to_add.len(),
        delta.to_remove.len()
    );
    Ok(Some(record))
}
