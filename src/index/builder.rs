//! Index builder
//!
//! Pure computation: nothing here touches the store.

use std::collections::BTreeSet;

use super::IndexEntry;
use crate::config::KeyLayout;
use crate::error::{OmError, Result};
use crate::hydrator::EntityRecord;
use crate::metadata::{EntityMetadata, IndexPolicy, StorageKind};

/// Index changes needed to move from one entry set to another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDelta {
    pub to_add: BTreeSet<IndexEntry>,
    pub to_remove: BTreeSet<IndexEntry>,
}

impl IndexDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Set difference of two entry sets
///
/// Entries present in both are untouched.
pub fn diff(old: &BTreeSet<IndexEntry>, new: &BTreeSet<IndexEntry>) -> IndexDelta {
    IndexDelta {
        to_add: new.difference(old).cloned().collect(),
        to_remove: old.difference(new).cloned().collect(),
    }
}

/// Computes index entries for records
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    layout: KeyLayout,
}

impl IndexBuilder {
    pub fn new(layout: KeyLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Every index entry `record` requires
    pub fn indexes_for(
        &self,
        record: &EntityRecord,
        metadata: &EntityMetadata,
    ) -> Result<BTreeSet<IndexEntry>> {
        let mut entries = BTreeSet::new();
        for spec in metadata.indexed_fields() {
            let raw = record.get(&spec.name).filter(|raw| !raw.is_empty());
            let value = match raw {
                Some(raw) => Some(index_value(&record.key, &spec.name, &spec.kind, raw)?),
                None if spec.index == IndexPolicy::IndexedNullable => None,
                None => continue,
            };
            let index_key =
                self.layout
                    .index_key(metadata.key_prefix(), &spec.name, value.as_deref());
            entries.insert(IndexEntry::new(index_key, record.key.clone()));
        }
        Ok(entries)
    }

    /// Whether `record`, as stored now, belongs in the index set `index_key`
    pub fn requires_entry(
        &self,
        record: &EntityRecord,
        metadata: &EntityMetadata,
        index_key: &str,
    ) -> Result<bool> {
        let entry = IndexEntry::new(index_key, record.key.clone());
        Ok(self.indexes_for(record, metadata)?.contains(&entry))
    }

    /// Index set key for a lookup value, as `indexes_for` would produce it
    pub fn lookup_key(
        &self,
        metadata: &EntityMetadata,
        field: &str,
        encoded: Option<&[u8]>,
    ) -> Result<String> {
        let spec = metadata.field(field).filter(|s| s.index.is_indexed()).ok_or_else(|| {
            OmError::NotIndexed {
                type_name: metadata.type_name().to_string(),
                field: field.to_string(),
            }
        })?;
        let value = match encoded.filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(index_value("", field, &spec.kind, raw)?),
            None => None,
        };
        Ok(self
            .layout
            .index_key(metadata.key_prefix(), field, value.as_deref()))
    }
}

/// Text form of a stored value inside an index key
fn index_value(key: &str, field: &str, kind: &StorageKind, raw: &[u8]) -> Result<String> {
    match kind {
        StorageKind::Bytes => Ok(hex(raw)),
        _ => String::from_utf8(raw.to_vec())
            .map_err(|_| OmError::decode(key, field, "invalid UTF-8 in indexed field")),
    }
}

fn hex(raw: &[u8]) -> String {
    raw.iter().map(|b| format!("{:02x}", b)).collect()
}
