//! Index Module
//!
//! Derives secondary-index entries from entity records.
//!
//! ## Responsibilities
//! - Compute the exact set of index entries a record requires
//! - Diff two entry sets into additions and retractions
//!
//! Each indexed field value maps to a set keyed by
//! `{index_namespace}:{prefix}:{field}:{value}` whose members are record
//! primary keys. Null and empty values are skipped unless the field is
//! declared `IndexedNullable`, in which case they land in the
//! `{index_namespace}:{prefix}:{field}#null` set.

mod builder;

pub use builder::{diff, IndexBuilder, IndexDelta};

/// A single index membership
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexEntry {
    /// Index set key (type + field + value)
    pub index_key: String,

    /// Member: the record's primary key
    pub member_key: String,
}

impl IndexEntry {
    pub fn new(index_key: impl Into<String>, member_key: impl Into<String>) -> Self {
        Self {
            index_key: index_key.into(),
            member_key: member_key.into(),
        }
    }
}
