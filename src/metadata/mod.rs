//! Metadata Module
//!
//! Entity mapping declarations and the registry that resolves them.
//!
//! ## Responsibilities
//! - Define the `Entity` accessor contract every mapped type satisfies
//! - Validate a type's `EntityMapping` declaration into `EntityMetadata`
//! - Cache resolved metadata per type (compute once, read many)
//! - Collect `MappedType` descriptors for the schema generator

mod registry;
mod value;

use std::any::TypeId;
use std::collections::HashSet;

use crate::error::{OmError, Result};

pub use registry::MetadataRegistry;
pub use value::Value;

/// Accessor contract for a persistable entity
///
/// `read_field` and `write_field` are called with every declared field
/// name; `write_field` receives `Value::Null` for fields absent from a
/// stored record.
pub trait Entity: Default + Clone + Send + Sync + 'static {
    /// Mapping declaration for this type; `None` if the type is not mapped
    fn mapping() -> Option<EntityMapping> {
        None
    }

    fn read_field(&self, name: &str) -> Value;

    fn write_field(&mut self, name: &str, value: Value) -> Result<()>;
}

// =============================================================================
// Field Declarations
// =============================================================================

/// How a field is encoded into the hash
#[derive(Debug, Clone, PartialEq)]
pub enum StorageKind {
    Text,
    Integer,
    Float,
    Boolean,
    Bytes,
    /// List of text values, stored as `field.0`, `field.1`, ...
    List,
    /// Nested value object, stored as `field.sub` keys
    Object(Vec<FieldSpec>),
}

impl StorageKind {
    /// Whether the value fits in a single hash field
    pub fn is_scalar(&self) -> bool {
        !matches!(self, StorageKind::List | StorageKind::Object(_))
    }
}

/// Whether and how a field participates in secondary indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexPolicy {
    #[default]
    None,
    /// Indexed by value; null and empty values are not indexed
    Indexed,
    /// Indexed by value, with null and empty values indexed under a null entry
    IndexedNullable,
}

impl IndexPolicy {
    pub fn is_indexed(&self) -> bool {
        !matches!(self, IndexPolicy::None)
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: StorageKind,
    pub index: IndexPolicy,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: StorageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            index: IndexPolicy::None,
        }
    }

    pub fn with_index(mut self, index: IndexPolicy) -> Self {
        self.index = index;
        self
    }
}

// =============================================================================
// Mapping Declaration
// =============================================================================

/// Externally supplied mapping declaration for one entity type
///
/// ```
/// use atlas_om::metadata::{EntityMapping, StorageKind};
///
/// let mapping = EntityMapping::new("Session")
///     .prefix("sessions")
///     .ttl(2)
///     .id("id", StorageKind::Text)
///     .indexed("user", StorageKind::Text)
///     .field("payload", StorageKind::Bytes);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping {
    type_name: String,
    prefix: Option<String>,
    identity: Vec<String>,
    ttl_seconds: Option<u64>,
    fields: Vec<FieldSpec>,
}

impl EntityMapping {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            prefix: None,
            identity: Vec::new(),
            ttl_seconds: None,
            fields: Vec::new(),
        }
    }

    /// Storage key prefix (defaults to the type name)
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Expire records this many seconds after each write; 0 disables
    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }

    /// Declare an identity field (call repeatedly for composite identities)
    pub fn id(mut self, name: impl Into<String>, kind: StorageKind) -> Self {
        let name = name.into();
        self.identity.push(name.clone());
        self.fields.push(FieldSpec::new(name, kind));
        self
    }

    pub fn field(mut self, name: impl Into<String>, kind: StorageKind) -> Self {
        self.fields.push(FieldSpec::new(name, kind));
        self
    }

    pub fn indexed(mut self, name: impl Into<String>, kind: StorageKind) -> Self {
        self.fields
            .push(FieldSpec::new(name, kind).with_index(IndexPolicy::Indexed));
        self
    }

    pub fn indexed_nullable(mut self, name: impl Into<String>, kind: StorageKind) -> Self {
        self.fields
            .push(FieldSpec::new(name, kind).with_index(IndexPolicy::IndexedNullable));
        self
    }

    /// Declare a fully built field
    pub fn spec(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }
}

// =============================================================================
// Resolved Metadata
// =============================================================================

/// Validated, immutable metadata for one entity type
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    type_name: String,
    key_prefix: String,
    identity: Vec<String>,
    ttl_seconds: Option<u64>,
    fields: Vec<FieldSpec>,
}

impl EntityMetadata {
    /// Validate a declaration
    pub fn from_mapping(mapping: EntityMapping) -> Result<Self> {
        let EntityMapping {
            type_name,
            prefix,
            identity,
            ttl_seconds,
            fields,
        } = mapping;

        let invalid = |reason: String| OmError::InvalidMapping(format!("{}: {}", type_name, reason));

        if type_name.is_empty() {
            return Err(OmError::InvalidMapping("empty type name".to_string()));
        }
        let key_prefix = prefix.unwrap_or_else(|| type_name.clone());
        // Prefixes are matched by `{prefix}:*` scans and must not nest
        if key_prefix.is_empty() || key_prefix.contains([':', '#', '*', '?', '[', ']', '\\']) {
            return Err(invalid(format!("invalid key prefix {:?}", key_prefix)));
        }
        if identity.is_empty() {
            return Err(invalid("no identity field declared".to_string()));
        }

        check_fields(&fields, true).map_err(invalid)?;

        for id in &identity {
            match fields.iter().find(|f| &f.name == id) {
                Some(spec) if spec.kind.is_scalar() => {}
                Some(_) => return Err(invalid(format!("identity field '{}' must be scalar", id))),
                None => return Err(invalid(format!("identity field '{}' not declared", id))),
            }
        }

        Ok(Self {
            type_name,
            key_prefix,
            identity,
            ttl_seconds: ttl_seconds.filter(|&t| t > 0),
            fields,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Identity field names, in declaration order
    pub fn identity(&self) -> &[String] {
        &self.identity
    }

    /// Record lifetime; `None` means no expiration
    pub fn ttl(&self) -> Option<u64> {
        self.ttl_seconds
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields participating in secondary indexes
    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.index.is_indexed())
    }

    pub fn is_indexed(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.index.is_indexed())
    }
}

/// Field names end up inside hash field names and index keys
fn check_fields(fields: &[FieldSpec], top_level: bool) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.is_empty() || field.name.contains([':', '.', '#', '*', '?', '[', ']']) {
            return Err(format!("invalid field name {:?}", field.name));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(format!("field '{}' declared twice", field.name));
        }
        if field.index.is_indexed() && (!top_level || !field.kind.is_scalar()) {
            return Err(format!("field '{}' cannot be indexed", field.name));
        }
        if let StorageKind::Object(nested) = &field.kind {
            if nested.is_empty() {
                return Err(format!("object field '{}' declares no sub-fields", field.name));
            }
            check_fields(nested, false)?;
        }
    }
    Ok(())
}

// =============================================================================
// Type Registration
// =============================================================================

/// Registration record for a mapped type, collected with `inventory`
///
/// ```ignore
/// inventory::submit! { MappedType::of::<Session>(module_path!()) }
/// ```
pub struct MappedType {
    /// Module scope the type belongs to
    pub scope: &'static str,
    type_id: fn() -> TypeId,
    rust_name: fn() -> &'static str,
    mapping: fn() -> Option<EntityMapping>,
}

impl MappedType {
    pub const fn of<E: Entity>(scope: &'static str) -> Self {
        Self {
            scope,
            type_id: TypeId::of::<E>,
            rust_name: std::any::type_name::<E>,
            mapping: E::mapping,
        }
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn rust_name(&self) -> &'static str {
        (self.rust_name)()
    }

    pub fn mapping(&self) -> Option<EntityMapping> {
        (self.mapping)()
    }

    /// Whether this type lives in `scope` or a module nested below it
    pub fn in_scope(&self, scope: &str) -> bool {
        self.scope == scope
            || self
                .scope
                .strip_prefix(scope)
                .is_some_and(|rest| rest.starts_with("::"))
    }
}

inventory::collect!(MappedType);

/// Every registered type whose scope falls under `scope`
pub fn mapped_types_in(scope: &str) -> Vec<&'static MappedType> {
    let mut types = Vec::new();
    for mapped in inventory::iter::<MappedType> {
        if mapped.in_scope(scope) {
            types.push(mapped);
        }
    }
    types.sort_by_key(|m| m.rust_name());
    types
}
