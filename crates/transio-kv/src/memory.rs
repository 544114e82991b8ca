//! In-memory key/value store
//!
//! Values live in a `HashMap` behind a `parking_lot::RwLock`. Expiry is lazy:
//! an expired slot is invisible to readers and is dropped by the next write
//! touching it or by [`KeyValueStore::expire_once`].

use crate::store::KeyValueStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;
use transio_common::Result;

struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: &[u8], ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_vec(),
            expires_at: deadline(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|ttl| Instant::now().checked_add(ttl))
}

/// Process-local key/value store
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, Slot>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|s| s.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_slot(
        entries: &mut HashMap<String, Slot>,
        key: &str,
        value: Option<&[u8]>,
        ttl: Option<Duration>,
    ) {
        match value {
            Some(value) => {
                entries.insert(key.to_string(), Slot::new(value, ttl));
            }
            None => {
                entries.remove(key);
            }
        }
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone()))
    }

    fn put(&self, key: &str, value: Option<&[u8]>, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.write();
        Self::write_slot(&mut entries, key, value, ttl);
        Ok(())
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Option<&[u8]>,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let current = entries
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.as_slice());
        if current != expected {
            trace!("cas({}) mismatch", key);
            return Ok(false);
        }
        Self::write_slot(&mut entries, key, value, ttl);
        Ok(true)
    }

    fn set_ttl(&self, key: &str, ttl: Option<Duration>) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(slot) if slot.is_live(now) => {
                slot.expires_at = deadline(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|(k, slot)| k.starts_with(prefix) && slot.is_live(now))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn expire_once(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, slot| slot.is_live(now));
        let purged = before - entries.len();
        if purged > 0 {
            trace!("expired {} keys", purged);
        }
        Ok(purged)
    }
}
