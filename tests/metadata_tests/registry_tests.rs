//! Tests for the metadata registry
//!
//! These tests verify:
//! - Mapping validation
//! - Compute-once caching, including under concurrent first access
//! - Unmapped types and prefix collisions
//! - Scope-based type discovery

#[path = "../common/mod.rs"]
mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use atlas_om::metadata::{
    mapped_types_in, Entity, EntityMapping, EntityMetadata, FieldSpec, IndexPolicy, StorageKind,
    Value,
};
use atlas_om::{MetadataRegistry, OmError, Result};

use common::{Dummy, Membership, Session, Unmapped};

// =============================================================================
// Helper Functions
// =============================================================================

fn validate(mapping: EntityMapping) -> Result<EntityMetadata> {
    EntityMetadata::from_mapping(mapping)
}

fn assert_invalid(mapping: EntityMapping) {
    let err = validate(mapping).unwrap_err();
    assert!(matches!(err, OmError::InvalidMapping(_)), "got {:?}", err);
}

/// Same prefix as `Dummy`
#[derive(Debug, Clone, Default)]
struct DummyClash;

impl Entity for DummyClash {
    fn mapping() -> Option<EntityMapping> {
        Some(EntityMapping::new("DummyClash").prefix("dummies").id("id", StorageKind::Text))
    }

    fn read_field(&self, _name: &str) -> Value {
        Value::Null
    }

    fn write_field(&mut self, _name: &str, _value: Value) -> Result<()> {
        Ok(())
    }
}

/// Prefix nested under `Dummy`'s
#[derive(Debug, Clone, Default)]
struct NestedAdmin;

impl Entity for NestedAdmin {
    fn mapping() -> Option<EntityMapping> {
        Some(EntityMapping::new("Admin").prefix("dummies:admin").id("id", StorageKind::Text))
    }

    fn read_field(&self, _name: &str) -> Value {
        Value::Null
    }

    fn write_field(&mut self, _name: &str, _value: Value) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_valid_mapping() {
    let metadata = validate(Dummy::mapping().unwrap()).unwrap();

    assert_eq!(metadata.type_name(), "Dummy");
    assert_eq!(metadata.key_prefix(), "dummies");
    assert_eq!(metadata.identity(), &["id".to_string()]);
    assert_eq!(metadata.ttl(), None);

    let indexed: Vec<&str> = metadata.indexed_fields().map(|f| f.name.as_str()).collect();
    assert_eq!(indexed, vec!["name", "nickname", "age"]);
    assert_eq!(
        metadata.field("nickname").unwrap().index,
        IndexPolicy::IndexedNullable
    );
    assert!(!metadata.is_indexed("score"));
}

#[test]
fn test_prefix_defaults_to_type_name() {
    let metadata = validate(EntityMapping::new("Car").id("vin", StorageKind::Text)).unwrap();
    assert_eq!(metadata.key_prefix(), "Car");
}

#[test]
fn test_zero_ttl_means_no_expiry() {
    let metadata =
        validate(EntityMapping::new("Car").ttl(0).id("vin", StorageKind::Text)).unwrap();
    assert_eq!(metadata.ttl(), None);

    let metadata = validate(Session::mapping().unwrap()).unwrap();
    assert_eq!(metadata.ttl(), Some(2));
}

#[test]
fn test_composite_identity_order() {
    let metadata = validate(Membership::mapping().unwrap()).unwrap();
    assert_eq!(metadata.identity(), &["org".to_string(), "user".to_string()]);
}

#[test]
fn test_rejects_missing_identity() {
    assert_invalid(EntityMapping::new("Car").field("vin", StorageKind::Text));
}

#[test]
fn test_rejects_bad_names() {
    assert_invalid(EntityMapping::new("").id("id", StorageKind::Text));
    assert_invalid(EntityMapping::new("Car").prefix("").id("id", StorageKind::Text));
    assert_invalid(EntityMapping::new("Car").prefix("car*").id("id", StorageKind::Text));
    assert_invalid(EntityMapping::new("Car").id("id", StorageKind::Text).field("a:b", StorageKind::Text));
    assert_invalid(EntityMapping::new("Car").id("id", StorageKind::Text).field("a.b", StorageKind::Text));
    assert_invalid(EntityMapping::new("Car").id("id", StorageKind::Text).field("a#b", StorageKind::Text));
}

#[test]
fn test_rejects_prefix_nesting_another() {
    // `users:*` scans would pick up these records as users
    assert_invalid(EntityMapping::new("Admin").prefix("users:admin").id("id", StorageKind::Text));
    assert_invalid(EntityMapping::new("Admin").prefix("users#admin").id("id", StorageKind::Text));
    assert_invalid(EntityMapping::new("Admin").prefix("users\\").id("id", StorageKind::Text));

    let registry = MetadataRegistry::new();
    let err = registry.resolve::<NestedAdmin>().unwrap_err();
    assert!(matches!(err, OmError::InvalidMapping(_)));
    assert!(registry.is_empty());
}

#[test]
fn test_rejects_duplicate_field() {
    assert_invalid(
        EntityMapping::new("Car")
            .id("id", StorageKind::Text)
            .field("model", StorageKind::Text)
            .indexed("model", StorageKind::Text),
    );
}

#[test]
fn test_rejects_non_scalar_index_and_identity() {
    assert_invalid(
        EntityMapping::new("Car")
            .id("id", StorageKind::Text)
            .indexed("tags", StorageKind::List),
    );
    assert_invalid(EntityMapping::new("Car").id("tags", StorageKind::List));
}

#[test]
fn test_rejects_index_inside_object() {
    assert_invalid(
        EntityMapping::new("Car").id("id", StorageKind::Text).field(
            "engine",
            StorageKind::Object(vec![
                FieldSpec::new("power", StorageKind::Integer).with_index(IndexPolicy::Indexed)
            ]),
        ),
    );
}

#[test]
fn test_rejects_empty_object() {
    assert_invalid(
        EntityMapping::new("Car")
            .id("id", StorageKind::Text)
            .field("engine", StorageKind::Object(Vec::new())),
    );
}

// =============================================================================
// Registry Tests
// =============================================================================

#[test]
fn test_resolve_caches_metadata() {
    let registry = MetadataRegistry::new();
    assert!(registry.is_empty());

    let first = registry.resolve::<Dummy>().unwrap();
    let second = registry.resolve::<Dummy>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(registry.contains::<Dummy>());
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.build_count(), 1);
}

#[test]
fn test_isolated_registries() {
    let a = MetadataRegistry::new();
    let b = MetadataRegistry::new();

    a.resolve::<Dummy>().unwrap();

    assert!(a.contains::<Dummy>());
    assert!(!b.contains::<Dummy>());
}

#[test]
fn test_global_registry_is_shared() {
    let a = MetadataRegistry::global();
    let b = MetadataRegistry::global();
    assert!(Arc::ptr_eq(&a, &b));

    let metadata = a.resolve::<Membership>().unwrap();
    assert!(Arc::ptr_eq(&metadata, &b.resolve::<Membership>().unwrap()));
}

#[test]
fn test_unmapped_entity() {
    let registry = MetadataRegistry::new();
    let err = registry.resolve::<Unmapped>().unwrap_err();

    assert!(matches!(err, OmError::UnmappedEntity { ref type_name } if type_name.ends_with("Unmapped")));
    assert!(registry.is_empty());
}

#[test]
fn test_prefix_collision_is_rejected() {
    let registry = MetadataRegistry::new();
    registry.resolve::<Dummy>().unwrap();

    let err = registry.resolve::<DummyClash>().unwrap_err();
    assert!(matches!(err, OmError::InvalidMapping(_)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_concurrent_first_access_builds_once() {
    let registry = Arc::new(MetadataRegistry::new());
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.resolve::<Dummy>().unwrap()
            })
        })
        .collect();

    let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(registry.build_count(), 1);
    for metadata in &resolved {
        assert!(Arc::ptr_eq(metadata, &resolved[0]));
    }
}

// =============================================================================
// Type Discovery Tests
// =============================================================================

#[test]
fn test_mapped_types_in_scope() {
    let names = |scope: &str| -> Vec<&'static str> {
        mapped_types_in(scope).iter().map(|m| m.rust_name()).collect()
    };

    let all = names("tests::fixtures");
    assert_eq!(all.len(), 3);
    assert!(all.iter().any(|n| n.ends_with("::Dummy")));
    assert!(all.iter().any(|n| n.ends_with("::Membership")));

    let expiring = names("tests::fixtures::expiring");
    assert_eq!(expiring.len(), 1);
    assert!(expiring[0].ends_with("::Session"));

    assert!(names("tests::fix").is_empty());
    assert!(names("other").is_empty());
}

#[test]
fn test_resolve_mapped() {
    let registry = MetadataRegistry::new();
    let types = mapped_types_in("tests::fixtures::expiring");

    let metadata = registry.resolve_mapped(types[0]).unwrap();

    assert_eq!(metadata.key_prefix(), "sessions");
    assert!(registry.contains::<Session>());
}

// =============================================================================
// Value Tests
// =============================================================================

#[test]
fn test_value_accessors() {
    assert_eq!(Value::from("x").expect_text("f").unwrap(), "x");
    assert_eq!(Value::Null.expect_integer_opt("f").unwrap(), None);
    assert_eq!(Value::from(Some(3i64)).expect_integer("f").unwrap(), 3);
    assert!(Value::from(None::<String>).is_null());

    let err = Value::from(true).expect_text("flag").unwrap_err();
    assert!(matches!(
        err,
        OmError::FieldType { ref field, expected: "text", found: "boolean" } if field == "flag"
    ));
}
