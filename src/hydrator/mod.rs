//! Hydrator Module
//!
//! Converts between entity instances and their flat hash records.
//!
//! ## Responsibilities
//! - Derive the deterministic primary key from identity fields
//! - Flatten every declared field into hash fields (`dehydrate`)
//! - Rebuild an entity from a stored hash (`hydrate`), the exact inverse
//!
//! See [`encoding`] for the per-kind hash layout.

pub mod encoding;

use std::collections::BTreeMap;

use crate::config::KeyLayout;
use crate::error::{OmError, Result};
use crate::metadata::{Entity, EntityMetadata};

use encoding::{decode_field, encode_field, encode_scalar};

/// Flattened hash representation of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    /// Primary key: `{prefix}:{identity}`
    pub key: String,

    /// Hash field name to stored bytes
    pub fields: BTreeMap<String, Vec<u8>>,
}

impl EntityRecord {
    pub fn new(key: impl Into<String>, fields: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&[u8]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Hash fields present here but absent from `newer`
    pub fn dropped_fields(&self, newer: &EntityRecord) -> Vec<String> {
        self.fields
            .keys()
            .filter(|f| !newer.fields.contains_key(*f))
            .cloned()
            .collect()
    }
}

/// Identity segment of an entity's primary key
///
/// Identity values are joined with `:` in declaration order. A null or
/// empty identity value fails with `MissingIdentity`. A composite identity
/// value containing `:` fails with `InvalidIdentity`, as the joined key
/// would no longer identify a single entity.
pub fn identity_of<E: Entity>(entity: &E, metadata: &EntityMetadata) -> Result<String> {
    let mut parts = Vec::with_capacity(metadata.identity().len());
    for name in metadata.identity() {
        let missing = || OmError::MissingIdentity {
            type_name: metadata.type_name().to_string(),
            field: name.clone(),
        };
        let spec = metadata.field(name).ok_or_else(missing)?;
        let bytes = encode_scalar(name, &spec.kind, &entity.read_field(name))?
            .filter(|b| !b.is_empty())
            .ok_or_else(missing)?;
        let part = String::from_utf8(bytes).map_err(|_| OmError::FieldType {
            field: name.clone(),
            expected: "UTF-8 identity",
            found: "binary",
        })?;
        if metadata.identity().len() > 1 && part.contains(':') {
            return Err(OmError::InvalidIdentity {
                type_name: metadata.type_name().to_string(),
                field: name.clone(),
                value: part,
            });
        }
        parts.push(part);
    }
    Ok(parts.join(":"))
}

/// Deterministic primary key of an entity
pub fn primary_key<E: Entity>(entity: &E, metadata: &EntityMetadata) -> Result<String> {
    Ok(KeyLayout::record_key(
        metadata.key_prefix(),
        &identity_of(entity, metadata)?,
    ))
}

/// Flatten an entity into its hash record
pub fn dehydrate<E: Entity>(entity: &E, metadata: &EntityMetadata) -> Result<EntityRecord> {
    let key = primary_key(entity, metadata)?;
    let mut fields = BTreeMap::new();
    for spec in metadata.fields() {
        encode_field(&spec.name, &spec.kind, &entity.read_field(&spec.name), &mut fields)?;
    }
    Ok(EntityRecord { key, fields })
}

/// Rebuild an entity from its hash record
///
/// Every declared field is written, `Value::Null` for absent ones. Hash
/// fields the metadata does not declare are ignored.
pub fn hydrate<E: Entity>(record: &EntityRecord, metadata: &EntityMetadata) -> Result<E> {
    let mut entity = E::default();
    for spec in metadata.fields() {
        let value = decode_field(&record.key, &spec.name, &spec.kind, &record.fields)?;
        entity.write_field(&spec.name, value)?;
    }
    Ok(entity)
}
