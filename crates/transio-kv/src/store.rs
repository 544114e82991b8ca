//! The key/value store capability.

use std::time::Duration;
use transio_common::{Error, Result};

/// Flat string-keyed store with per-key TTL and compare-and-set.
///
/// Every key carries its own TTL; `None` means the key never expires. Writing
/// an absent value (`None`) deletes the key. Implementations must make
/// [`compare_and_set`](Self::compare_and_set) atomic with respect to every
/// other writer of the same store, across threads and (for shared backends)
/// across processes.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value of a key
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Read the value of a key as UTF-8 text
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get(key)?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|e| {
                    Error::Deserialization(format!("value of {key} is not UTF-8: {e}"))
                })
            })
            .transpose()
    }

    /// Write (or delete, when `value` is `None`) a key
    fn put(&self, key: &str, value: Option<&[u8]>, ttl: Option<Duration>) -> Result<()>;

    /// Atomically replace the value of `key` if it currently equals `expected`.
    ///
    /// `expected == None` requires the key to be absent; `value == None`
    /// deletes it. Returns whether the swap happened.
    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Option<&[u8]>,
        ttl: Option<Duration>,
    ) -> Result<bool>;

    /// Replace the TTL of an existing key. Returns false if the key is absent.
    fn set_ttl(&self, key: &str, ttl: Option<Duration>) -> Result<bool>;

    /// All live keys starting with `prefix`
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every key
    fn clear(&self) -> Result<()>;

    /// Purge expired keys, returning how many were dropped.
    ///
    /// Expired keys are never visible to readers; this only reclaims space.
    fn expire_once(&self) -> Result<usize> {
        Ok(0)
    }
}
