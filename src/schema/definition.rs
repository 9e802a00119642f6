//! Schema marker definitions
//!
//! ## Marker Format
//! ```text
//! {schema}:{prefix}   hash
//!   definition  -> bincode(SchemaDefinition)
//!   checksum    -> CRC32 of `definition`, decimal
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{OmError, Result};
use crate::metadata::{EntityMetadata, IndexPolicy};

/// Marker format version
pub const SCHEMA_VERSION: u32 = 1;

const DEFINITION_FIELD: &str = "definition";
const CHECKSUM_FIELD: &str = "checksum";

/// Stored description of one entity type's index layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub version: u32,
    pub type_name: String,
    pub prefix: String,
    pub ttl_seconds: Option<u64>,
    pub indexes: Vec<IndexDefinition>,
}

/// One indexed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub field: String,
    /// Null and empty values are indexed under the null entry
    pub nullable: bool,
}

impl SchemaDefinition {
    pub fn from_metadata(metadata: &EntityMetadata) -> Self {
        Self {
            version: SCHEMA_VERSION,
            type_name: metadata.type_name().to_string(),
            prefix: metadata.key_prefix().to_string(),
            ttl_seconds: metadata.ttl(),
            indexes: metadata
                .indexed_fields()
                .map(|spec| IndexDefinition {
                    field: spec.name.clone(),
                    nullable: spec.index == IndexPolicy::IndexedNullable,
                })
                .collect(),
        }
    }

    /// Hash fields of the marker
    pub fn encode(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let bytes = bincode::serialize(self).map_err(|e| OmError::Serialization(e.to_string()))?;
        let checksum = crc32fast::hash(&bytes);

        let mut fields = BTreeMap::new();
        fields.insert(DEFINITION_FIELD.to_string(), bytes);
        fields.insert(CHECKSUM_FIELD.to_string(), checksum.to_string().into_bytes());
        Ok(fields)
    }

    /// Read a marker hash back, verifying its checksum
    pub fn decode(key: &str, fields: &BTreeMap<String, Vec<u8>>) -> Result<Self> {
        let bytes = fields
            .get(DEFINITION_FIELD)
            .ok_or_else(|| OmError::decode(key, DEFINITION_FIELD, "missing"))?;
        let stored = fields
            .get(CHECKSUM_FIELD)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| OmError::decode(key, CHECKSUM_FIELD, "missing or not a number"))?;

        let computed = crc32fast::hash(bytes);
        if stored != computed {
            return Err(OmError::decode(
                key,
                CHECKSUM_FIELD,
                format!("checksum mismatch: stored {}, computed {}", stored, computed),
            ));
        }

        bincode::deserialize(bytes).map_err(|e| OmError::decode(key, DEFINITION_FIELD, e.to_string()))
    }

    /// Whether `fields` holds exactly what `encode` would write
    pub(crate) fn is_encoded_in(&self, fields: &BTreeMap<String, Vec<u8>>) -> bool {
        fields.len() == 2
            && matches!(Self::decode("", fields), Ok(ref stored) if stored == self)
    }
}
