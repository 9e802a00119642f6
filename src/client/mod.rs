//! Key-Value Client Adapter
//!
//! The capability interface the mapper needs from the underlying store,
//! plus two implementations:
//! - [`MemoryClient`]: in-process store with lazy expiry
//! - [`RedisClient`]: synchronous RESP2 client over TCP
//!
//! Every method is a single atomic store operation. Nothing here spans
//! more than one key, so callers composing several calls can be observed
//! half-way through by concurrent readers.

mod glob;
mod memory;
mod redis;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::Result;

pub use glob::glob_match;
pub use memory::MemoryClient;
pub use redis::RedisClient;

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist
    Missing,

    /// Key exists with no expiry
    Persistent,

    /// Key expires in this many seconds
    Expires(u64),
}

impl KeyTtl {
    /// Map the store's integer reply (-2 missing, -1 persistent)
    pub fn from_reply(reply: i64) -> Self {
        match reply {
            -2 => KeyTtl::Missing,
            r if r < 0 => KeyTtl::Persistent,
            r => KeyTtl::Expires(r as u64),
        }
    }
}

/// Store operations used by the mapper
///
/// All calls fail with `OmError::StoreUnavailable` on connectivity loss
/// or timeout.
pub trait KvClient: Send + Sync {
    /// Get a string value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a string value, clearing any expiry
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// Delete a key; returns whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Set a single hash field
    fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), value.to_vec());
        self.hash_set_all(key, &fields)
    }

    /// Set many hash fields in one atomic call; a no-op when `fields` is empty
    fn hash_set_all(&self, key: &str, fields: &BTreeMap<String, Vec<u8>>) -> Result<()>;

    /// Every field of a hash; empty when the key does not exist
    fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, Vec<u8>>>;

    /// Delete hash fields; returns how many existed
    fn hash_delete(&self, key: &str, fields: &[String]) -> Result<usize>;

    /// Expire a key after `seconds`; zero deletes it. Returns whether it existed.
    fn expire(&self, key: &str, seconds: u64) -> Result<bool>;

    fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Add a set member; returns whether it was newly added
    fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a set member; returns whether it was present
    fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    fn set_members(&self, key: &str) -> Result<BTreeSet<String>>;

    /// Every key matching a glob pattern
    fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove every key (test/utility use only)
    fn flush_all(&self) -> Result<()>;
}

macro_rules! delegate_kv_client {
    ($($target:ty),*) => {$(
        impl<C: KvClient + ?Sized> KvClient for $target {
            fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
                (**self).get(key)
            }
            fn set(&self, key: &str, value: &[u8]) -> Result<()> {
                (**self).set(key, value)
            }
            fn exists(&self, key: &str) -> Result<bool> {
                (**self).exists(key)
            }
            fn delete(&self, key: &str) -> Result<bool> {
                (**self).delete(key)
            }
            fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
                (**self).hash_set(key, field, value)
            }
            fn hash_set_all(&self, key: &str, fields: &BTreeMap<String, Vec<u8>>) -> Result<()> {
                (**self).hash_set_all(key, fields)
            }
            fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, Vec<u8>>> {
                (**self).hash_get_all(key)
            }
            fn hash_delete(&self, key: &str, fields: &[String]) -> Result<usize> {
                (**self).hash_delete(key, fields)
            }
            fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
                (**self).expire(key, seconds)
            }
            fn ttl(&self, key: &str) -> Result<KeyTtl> {
                (**self).ttl(key)
            }
            fn set_add(&self, key: &str, member: &str) -> Result<bool> {
                (**self).set_add(key, member)
            }
            fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
                (**self).set_remove(key, member)
            }
            fn set_members(&self, key: &str) -> Result<BTreeSet<String>> {
                (**self).set_members(key)
            }
            fn scan(&self, pattern: &str) -> Result<Vec<String>> {
                (**self).scan(pattern)
            }
            fn flush_all(&self) -> Result<()> {
                (**self).flush_all()
            }
        }
    )*};
}

delegate_kv_client!(&C, Arc<C>, Box<C>);
