//! Tests for SchemaGenerator
//!
//! These tests verify:
//! - Markers are created per mapped type in a scope
//! - Re-running is idempotent and never touches entity data
//! - Corrupt and outdated markers are repaired
//! - Orphan index members are swept

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use atlas_om::client::KvClient;
use atlas_om::config::{Config, KeyLayout};
use atlas_om::metadata::{mapped_types_in, Entity, EntityMapping, MappedType, StorageKind, Value};
use atlas_om::schema::{SchemaDefinition, SCHEMA_VERSION};
use atlas_om::{MemoryClient, MetadataRegistry, OmError, Result, SchemaGenerator};

use common::{dummy, manager_on, Dummy, Session, FIXTURE_SCOPE};

// =============================================================================
// Helper Functions
// =============================================================================

fn generator(
    client: &Arc<MemoryClient>,
    registry: &Arc<MetadataRegistry>,
) -> SchemaGenerator<Arc<MemoryClient>> {
    SchemaGenerator::with_registry(Arc::clone(client), Arc::clone(registry))
}

fn fresh() -> (Arc<MemoryClient>, Arc<MetadataRegistry>) {
    (
        Arc::new(MemoryClient::new()),
        Arc::new(MetadataRegistry::new()),
    )
}

/// Same prefix as `Dummy`, fewer indexes
#[derive(Debug, Clone, Default)]
struct DummyV0;

impl Entity for DummyV0 {
    fn mapping() -> Option<EntityMapping> {
        Some(
            EntityMapping::new("Dummy")
                .prefix("dummies")
                .id("id", StorageKind::Text)
                .indexed("name", StorageKind::Text),
        )
    }

    fn read_field(&self, _name: &str) -> Value {
        Value::Null
    }

    fn write_field(&mut self, _name: &str, _value: Value) -> Result<()> {
        Ok(())
    }
}

/// Prefix equal to the default index namespace
#[derive(Debug, Clone, Default)]
struct IndexShadow {
    id: String,
}

impl Entity for IndexShadow {
    fn mapping() -> Option<EntityMapping> {
        Some(
            EntityMapping::new("IndexShadow")
                .prefix("idx")
                .id("id", StorageKind::Text),
        )
    }

    fn read_field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.clone().into(),
            _ => Value::Null,
        }
    }

    fn write_field(&mut self, name: &str, value: Value) -> Result<()> {
        if name == "id" {
            self.id = value.expect_text(name)?;
        }
        Ok(())
    }
}

// =============================================================================
// Generation Tests
// =============================================================================

#[test]
fn test_generate_for_scope_creates_markers() {
    let (client, registry) = fresh();

    let report = generator(&client, &registry)
        .generate_schema_for_scope(FIXTURE_SCOPE)
        .unwrap();

    let mut created = report.created.clone();
    created.sort();
    assert_eq!(created, vec!["Dummy", "Membership", "Session"]);
    assert!(report.updated.is_empty());
    assert!(report.unchanged.is_empty());

    assert!(client.exists("schema:dummies").unwrap());
    assert!(client.exists("schema:sessions").unwrap());
    assert!(client.exists("schema:memberships").unwrap());
}

#[test]
fn test_generate_nested_scope_only() {
    let (client, registry) = fresh();

    let report = generator(&client, &registry)
        .generate_schema_for_scope("tests::fixtures::expiring")
        .unwrap();

    assert_eq!(report.created, vec!["Session"]);
    assert!(!client.exists("schema:dummies").unwrap());
}

#[test]
fn test_generate_explicit_types() {
    let (client, registry) = fresh();
    let types: Vec<&MappedType> = mapped_types_in("tests::fixtures::expiring");

    let report = generator(&client, &registry).generate_schema(&types).unwrap();

    assert_eq!(report.total(), 1);
    assert!(registry.contains::<Session>());
}

#[test]
fn test_generate_twice_is_idempotent() {
    let (client, registry) = fresh();
    let schemas = generator(&client, &registry);

    schemas.generate_schema_for_scope(FIXTURE_SCOPE).unwrap();
    let before = client.hash_get_all("schema:dummies").unwrap();

    let report = schemas.generate_schema_for_scope(FIXTURE_SCOPE).unwrap();

    assert!(report.created.is_empty());
    assert!(report.updated.is_empty());
    assert_eq!(report.unchanged.len(), 3);
    assert_eq!(client.hash_get_all("schema:dummies").unwrap(), before);
    assert_eq!(client.scan("schema:*").unwrap().len(), 3);
}

#[test]
fn test_generate_keeps_entity_data() {
    let (client, registry) = fresh();
    let schemas = generator(&client, &registry);
    schemas.generate_for::<Dummy>().unwrap();

    let mut manager = manager_on(Arc::clone(&client), &registry);
    manager.persist(&dummy("a1", "foo")).unwrap();
    manager.flush().unwrap();
    let keys_before = client.scan("*").unwrap();

    schemas.generate_schema_for_scope(FIXTURE_SCOPE).unwrap();

    for key in &keys_before {
        assert!(client.exists(key).unwrap(), "{} was removed", key);
    }
    assert_eq!(manager.lookup_ids::<Dummy>("name", "foo").unwrap(), vec!["a1"]);
}

#[test]
fn test_read_definition() {
    let (client, registry) = fresh();
    let schemas = generator(&client, &registry);

    assert_eq!(schemas.read_definition("sessions").unwrap(), None);
    schemas.generate_for::<Session>().unwrap();

    let definition = schemas.read_definition("sessions").unwrap().unwrap();
    assert_eq!(definition.version, SCHEMA_VERSION);
    assert_eq!(definition.type_name, "Session");
    assert_eq!(definition.ttl_seconds, Some(2));
    assert_eq!(definition.indexes.len(), 1);
    assert_eq!(definition.indexes[0].field, "user");
}

#[test]
fn test_list_schemas_skips_corrupt_markers() {
    let (client, registry) = fresh();
    let schemas = generator(&client, &registry);
    schemas.generate_schema_for_scope(FIXTURE_SCOPE).unwrap();
    client.hash_set("schema:broken", "definition", b"junk").unwrap();

    let prefixes: Vec<String> = schemas
        .list_schemas()
        .unwrap()
        .into_iter()
        .map(|d| d.prefix)
        .collect();

    assert_eq!(prefixes, vec!["dummies", "memberships", "sessions"]);
}

#[test]
fn test_custom_schema_namespace() {
    let (client, registry) = fresh();
    let layout = Config::builder().schema_namespace("meta").build().key_layout();

    generator(&client, &registry)
        .with_layout(layout)
        .generate_for::<Dummy>()
        .unwrap();

    assert!(client.exists("meta:dummies").unwrap());
    assert!(!client.exists("schema:dummies").unwrap());
}

#[test]
fn test_prefix_colliding_with_namespace() {
    let layout = KeyLayout::default();
    assert!(layout.check_prefix("idx").is_err());
    assert!(layout.check_prefix("schema").is_err());
    assert!(layout.check_prefix("idxs").is_ok());
    assert!(layout.check_prefix("dummies").is_ok());

    let nested = Config::builder().index_namespace("om:idx").build().key_layout();
    assert!(nested.check_prefix("om").is_err());
    assert!(nested.check_prefix("idx").is_ok());
}

#[test]
fn test_namespace_prefix_is_refused() {
    let (client, registry) = fresh();

    let err = generator(&client, &registry)
        .generate_for::<IndexShadow>()
        .unwrap_err();
    assert!(matches!(err, OmError::InvalidMapping(_)));
    assert!(matches!(
        generator(&client, &registry).sweep_orphans::<IndexShadow>().unwrap_err(),
        OmError::InvalidMapping(_)
    ));

    let mut manager = manager_on(Arc::clone(&client), &registry);
    let shadow = IndexShadow { id: "x".to_string() };
    assert!(matches!(
        manager.persist(&shadow).unwrap_err(),
        OmError::InvalidMapping(_)
    ));
    assert!(client.scan("*").unwrap().is_empty());
}

// =============================================================================
// Repair Tests
// =============================================================================

#[test]
fn test_corrupt_marker_is_repaired() {
    let (client, registry) = fresh();
    let schemas = generator(&client, &registry);
    schemas.generate_for::<Dummy>().unwrap();

    client.hash_set("schema:dummies", "checksum", b"1").unwrap();
    client.hash_set("schema:dummies", "stray", b"x").unwrap();
    assert!(matches!(
        schemas.read_definition("dummies").unwrap_err(),
        OmError::Decode { .. }
    ));

    let report = schemas.generate_for::<Dummy>().unwrap();

    assert_eq!(report.updated, vec!["Dummy"]);
    let stored = client.hash_get_all("schema:dummies").unwrap();
    assert_eq!(stored.len(), 2);
    assert!(schemas.read_definition("dummies").unwrap().is_some());
}

#[test]
fn test_outdated_marker_is_rewritten() {
    let (client, _) = fresh();

    let old_registry = Arc::new(MetadataRegistry::new());
    generator(&client, &old_registry)
        .generate_for::<DummyV0>()
        .unwrap();
    assert_eq!(
        generator(&client, &old_registry)
            .read_definition("dummies")
            .unwrap()
            .unwrap()
            .indexes
            .len(),
        1
    );

    let registry = Arc::new(MetadataRegistry::new());
    let report = generator(&client, &registry).generate_for::<Dummy>().unwrap();

    assert_eq!(report.updated, vec!["Dummy"]);
    let definition = generator(&client, &registry)
        .read_definition("dummies")
        .unwrap()
        .unwrap();
    assert_eq!(
        definition,
        SchemaDefinition::from_metadata(&registry.resolve::<Dummy>().unwrap())
    );
}

// =============================================================================
// Sweep Tests
// =============================================================================

#[test]
fn test_sweep_orphans() {
    let (client, registry) = fresh();
    let schemas = generator(&client, &registry);
    schemas.generate_for::<Dummy>().unwrap();

    let mut manager = manager_on(Arc::clone(&client), &registry);
    manager.persist(&dummy("a1", "foo")).unwrap();
    manager.persist(&dummy("a2", "foo")).unwrap();
    manager.flush().unwrap();

    // Record gone without its indexes
    client.delete("dummies:a2").unwrap();
    // Index entry left behind by an interrupted update
    client.set_add("idx:dummies:name:stale", "dummies:a1").unwrap();

    let removed = schemas.sweep_orphans::<Dummy>().unwrap();

    // a2: name, nickname#null, age:0; a1: name:stale
    assert_eq!(removed, 4);
    assert_eq!(
        client.set_members("idx:dummies:name:foo").unwrap().into_iter().collect::<Vec<_>>(),
        vec!["dummies:a1".to_string()]
    );
    assert!(!client.exists("idx:dummies:name:stale").unwrap());

    assert_eq!(schemas.sweep_orphans::<Dummy>().unwrap(), 0);
}
