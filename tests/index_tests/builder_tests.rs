//! Tests for the index builder
//!
//! These tests verify:
//! - One entry per indexed field value
//! - Null and empty values are skipped unless indexed as null
//! - Lookup keys match the keys entries are written under
//! - Diffs retract exactly the stale entries

#[path = "../common/mod.rs"]
mod common;

use std::collections::BTreeSet;

use atlas_om::config::{Config, KeyLayout};
use atlas_om::hydrator::dehydrate;
use atlas_om::index::{diff, IndexBuilder, IndexEntry};
use atlas_om::{MetadataRegistry, OmError};

use common::{dummy, full_dummy, Dummy, Session};

// =============================================================================
// Helper Functions
// =============================================================================

fn entries_for(entity: &Dummy) -> BTreeSet<IndexEntry> {
    let meta = MetadataRegistry::new().resolve::<Dummy>().unwrap();
    let record = dehydrate(entity, &meta).unwrap();
    IndexBuilder::default().indexes_for(&record, &meta).unwrap()
}

fn index_keys(entries: &BTreeSet<IndexEntry>) -> Vec<&str> {
    entries.iter().map(|e| e.index_key.as_str()).collect()
}

// =============================================================================
// Entry Computation Tests
// =============================================================================

#[test]
fn test_indexes_for_full_entity() {
    let entries = entries_for(&full_dummy("a1"));

    assert_eq!(
        index_keys(&entries),
        vec!["idx:dummies:age:42", "idx:dummies:name:Joe", "idx:dummies:nickname:jo"]
    );
    assert!(entries.iter().all(|e| e.member_key == "dummies:a1"));
}

#[test]
fn test_null_value_skipped_unless_nullable() {
    let mut entity = dummy("a1", "foo");
    entity.name = None;

    let entries = entries_for(&entity);

    assert_eq!(
        index_keys(&entries),
        vec!["idx:dummies:age:0", "idx:dummies:nickname#null"]
    );
}

#[test]
fn test_empty_string_is_not_indexed() {
    let mut entity = dummy("a1", "");
    entity.nickname = Some(String::new());

    let entries = entries_for(&entity);

    assert!(!index_keys(&entries).contains(&"idx:dummies:name:"));
    assert!(index_keys(&entries).contains(&"idx:dummies:nickname#null"));
}

#[test]
fn test_custom_index_namespace() {
    let layout = Config::builder().index_namespace("ix").build().key_layout();
    let meta = MetadataRegistry::new().resolve::<Session>().unwrap();
    let record = dehydrate(&common::session("s1", "joe"), &meta).unwrap();

    let entries = IndexBuilder::new(layout).indexes_for(&record, &meta).unwrap();

    assert_eq!(index_keys(&entries), vec!["ix:sessions:user:joe"]);
}

// =============================================================================
// Lookup Key Tests
// =============================================================================

#[test]
fn test_lookup_key_matches_entries() {
    let meta = MetadataRegistry::new().resolve::<Dummy>().unwrap();
    let builder = IndexBuilder::default();

    assert_eq!(
        builder.lookup_key(&meta, "name", Some("Joe".as_bytes())).unwrap(),
        "idx:dummies:name:Joe"
    );
    assert_eq!(
        builder.lookup_key(&meta, "nickname", None).unwrap(),
        "idx:dummies:nickname#null"
    );
}

#[test]
fn test_lookup_key_rejects_unindexed_field() {
    let meta = MetadataRegistry::new().resolve::<Dummy>().unwrap();

    let err = IndexBuilder::default()
        .lookup_key(&meta, "score", Some("1".as_bytes()))
        .unwrap_err();

    assert!(matches!(err, OmError::NotIndexed { ref field, .. } if field == "score"));
}

// =============================================================================
// Diff Tests
// =============================================================================

#[test]
fn test_diff_after_value_change() {
    let before = entries_for(&dummy("a1", "foo"));
    let after = entries_for(&dummy("a1", "bar"));

    let delta = diff(&before, &after);

    assert_eq!(
        delta.to_add.into_iter().collect::<Vec<_>>(),
        vec![IndexEntry::new("idx:dummies:name:bar", "dummies:a1")]
    );
    assert_eq!(
        delta.to_remove.into_iter().collect::<Vec<_>>(),
        vec![IndexEntry::new("idx:dummies:name:foo", "dummies:a1")]
    );
}

#[test]
fn test_diff_from_nothing_adds_everything() {
    let after = entries_for(&full_dummy("a1"));
    let delta = diff(&BTreeSet::new(), &after);

    assert_eq!(delta.to_add, after);
    assert!(delta.to_remove.is_empty());
}

#[test]
fn test_diff_unchanged_is_empty() {
    let entries = entries_for(&full_dummy("a1"));
    assert!(diff(&entries, &entries.clone()).is_empty());
}

// =============================================================================
// Key Layout Tests
// =============================================================================

#[test]
fn test_key_layout() {
    let layout = KeyLayout::default();

    assert_eq!(KeyLayout::record_key("dummies", "a1"), "dummies:a1");
    assert_eq!(KeyLayout::identity_of("dummies", "dummies:a:b"), Some("a:b"));
    assert_eq!(KeyLayout::identity_of("dummies", "dummiesx:a"), None);
    assert_eq!(layout.index_key("dummies", "name", Some("foo")), "idx:dummies:name:foo");
    assert_eq!(layout.index_key("dummies", "name", None), "idx:dummies:name#null");
    assert_eq!(layout.schema_key("dummies"), "schema:dummies");
    assert_eq!(layout.index_pattern("dummies"), "idx:dummies:*");
}
