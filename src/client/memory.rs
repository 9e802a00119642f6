//! In-process store
//!
//! HashMap of typed values behind a `parking_lot::RwLock`. Expired keys are
//! invisible to reads and dropped by the next write that touches them, or
//! in bulk by `purge_expired`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::{glob_match, KeyTtl, KvClient};
use crate::error::{OmError, Result};

#[derive(Debug, Clone)]
enum StoredValue {
    Str(Vec<u8>),
    Hash(BTreeMap<String, Vec<u8>>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: StoredValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }

    fn is_empty(&self) -> bool {
        match &self.value {
            StoredValue::Str(_) => false,
            StoredValue::Hash(h) => h.is_empty(),
            StoredValue::Set(s) => s.is_empty(),
        }
    }
}

/// In-memory `KvClient`
///
/// ## Concurrency:
/// - Reads take the read lock and skip expired slots
/// - Writes take the write lock; each method is one atomic operation
#[derive(Debug, Default)]
pub struct MemoryClient {
    data: RwLock<HashMap<String, Slot>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.read().values().filter(|s| s.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, slot| slot.is_live(now));
        before - data.len()
    }

    /// Run `f` against a live slot under the read lock
    fn read_slot<T>(&self, key: &str, f: impl FnOnce(Option<&Slot>) -> Result<T>) -> Result<T> {
        let data = self.data.read();
        let now = Instant::now();
        f(data.get(key).filter(|slot| slot.is_live(now)))
    }

    /// Run `f` against the slot under the write lock, dropping it first if
    /// expired and afterwards if it was left empty
    fn write_slot<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Option<Slot>) -> Result<T>,
    ) -> Result<T> {
        let mut data = self.data.write();
        let now = Instant::now();
        let mut slot = data.remove(key).filter(|slot| slot.is_live(now));
        let result = f(&mut slot);
        if let Some(slot) = slot.filter(|s| !s.is_empty()) {
            data.insert(key.to_string(), slot);
        }
        result
    }
}

fn wrong_type(key: &str) -> OmError {
    OmError::WrongType {
        key: key.to_string(),
    }
}

impl KvClient for MemoryClient {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read_slot(key, |slot| match slot.map(|s| &s.value) {
            None => Ok(None),
            Some(StoredValue::Str(v)) => Ok(Some(v.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write_slot(key, |slot| {
            *slot = Some(Slot::new(StoredValue::Str(value.to_vec())));
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.read_slot(key, |slot| Ok(slot.is_some()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.write_slot(key, |slot| Ok(slot.take().is_some()))
    }

    fn hash_set_all(&self, key: &str, fields: &BTreeMap<String, Vec<u8>>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        self.write_slot(key, |slot| {
            let slot = slot.get_or_insert_with(|| Slot::new(StoredValue::Hash(BTreeMap::new())));
            match &mut slot.value {
                StoredValue::Hash(hash) => {
                    for (field, value) in fields {
                        hash.insert(field.clone(), value.clone());
                    }
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        self.read_slot(key, |slot| match slot.map(|s| &s.value) {
            None => Ok(BTreeMap::new()),
            Some(StoredValue::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    fn hash_delete(&self, key: &str, fields: &[String]) -> Result<usize> {
        self.write_slot(key, |slot| match slot.as_mut().map(|s| &mut s.value) {
            None => Ok(0),
            Some(StoredValue::Hash(hash)) => {
                Ok(fields.iter().filter(|f| hash.remove(*f).is_some()).count())
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        self.write_slot(key, |slot| {
            if slot.is_none() {
                return Ok(false);
            }
            if seconds == 0 {
                *slot = None;
            } else if let Some(slot) = slot.as_mut() {
                slot.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
            }
            Ok(true)
        })
    }

    fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.read_slot(key, |slot| {
            Ok(match slot {
                None => KeyTtl::Missing,
                Some(Slot {
                    expires_at: None, ..
                }) => KeyTtl::Persistent,
                Some(Slot {
                    expires_at: Some(at),
                    ..
                }) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    KeyTtl::Expires((remaining.as_millis() as u64 + 500) / 1000)
                }
            })
        })
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.write_slot(key, |slot| {
            let slot = slot.get_or_insert_with(|| Slot::new(StoredValue::Set(BTreeSet::new())));
            match &mut slot.value {
                StoredValue::Set(set) => Ok(set.insert(member.to_string())),
                _ => Err(wrong_type(key)),
            }
        })
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.write_slot(key, |slot| match slot.as_mut().map(|s| &mut s.value) {
            None => Ok(false),
            Some(StoredValue::Set(set)) => Ok(set.remove(member)),
            Some(_) => Err(wrong_type(key)),
        })
    }

    fn set_members(&self, key: &str) -> Result<BTreeSet<String>> {
        self.read_slot(key, |slot| match slot.map(|s| &s.value) {
            None => Ok(BTreeSet::new()),
            Some(StoredValue::Set(set)) => Ok(set.clone()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let data = self.data.read();
        let mut keys: Vec<String> = data
            .iter()
            .filter(|(key, slot)| slot.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn flush_all(&self) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }
}
