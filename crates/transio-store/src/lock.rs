//! Per-entry advisory blob lock
//!
//! The lock is a token key created with compare-and-set and a TTL, so a
//! holder that dies without releasing it only blocks the entry until the
//! token expires. Mutual exclusion is therefore bounded by the lock TTL.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use transio_common::{Error, LockConfig, Result};
use transio_kv::KeyValueStore;

use crate::keys::KeyCodec;

const LOCK_TOKEN: &[u8] = b"locked";
const INITIAL_BACKOFF: Duration = Duration::from_millis(1);

/// Acquires and releases blob locks of a store
#[derive(Clone)]
pub struct BlobLockManager {
    kv: Arc<dyn KeyValueStore>,
    keys: KeyCodec,
    config: LockConfig,
}

impl BlobLockManager {
    pub fn new(kv: Arc<dyn KeyValueStore>, keys: KeyCodec, config: LockConfig) -> Self {
        Self { kv, keys, config }
    }

    /// Single attempt to create the lock token
    pub fn try_acquire_once(&self, entry: &str) -> Result<bool> {
        self.kv.compare_and_set(
            &self.keys.blob_lock(entry),
            None,
            Some(LOCK_TOKEN),
            Some(self.config.ttl()),
        )
    }

    /// Retry [`try_acquire_once`](Self::try_acquire_once) until the lock
    /// timeout elapses.
    ///
    /// Sleeps start at 1 ms; once the wait has lasted longer than the
    /// backoff threshold they double, up to the maximum backoff. The last
    /// sleep is cut so the deadline is not overshot.
    pub fn try_acquire(&self, entry: &str) -> Result<bool> {
        let start = Instant::now();
        let deadline = start + self.config.timeout();
        let mut sleep = INITIAL_BACKOFF;
        loop {
            if self.try_acquire_once(entry)? {
                trace!("Acquired blob lock of {} after {:?}", entry, start.elapsed());
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(sleep.min(deadline - now));
            if start.elapsed() >= self.config.backoff_threshold() {
                sleep = (sleep * 2).min(self.config.max_backoff());
            }
        }
    }

    /// [`try_acquire`](Self::try_acquire), failing with
    /// [`Error::LockTimeout`] when the lock could not be taken
    pub fn acquire_or_throw(&self, entry: &str) -> Result<()> {
        if self.try_acquire(entry)? {
            Ok(())
        } else {
            Err(Error::LockTimeout {
                key: self.keys.blob_lock(entry),
                waited_ms: self.config.timeout_ms,
            })
        }
    }

    /// Delete the lock token
    pub fn release(&self, entry: &str) -> Result<()> {
        self.kv.put(&self.keys.blob_lock(entry), None, None)
    }

    /// Acquire the lock, releasing it when the guard drops
    pub fn lock(&self, entry: &str) -> Result<BlobLockGuard<'_>> {
        self.acquire_or_throw(entry)?;
        Ok(BlobLockGuard {
            manager: self,
            entry: entry.to_string(),
        })
    }

    /// Try to acquire the lock. On timeout the caller proceeds unlocked.
    pub fn lock_best_effort(&self, entry: &str) -> Result<Option<BlobLockGuard<'_>>> {
        if self.try_acquire(entry)? {
            Ok(Some(BlobLockGuard {
                manager: self,
                entry: entry.to_string(),
            }))
        } else {
            debug!("Proceeding without blob lock of {}", entry);
            Ok(None)
        }
    }
}

/// Held blob lock
pub struct BlobLockGuard<'a> {
    manager: &'a BlobLockManager,
    entry: String,
}

impl Drop for BlobLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.manager.release(&self.entry) {
            // The token still expires with its TTL
            warn!("Failed to release blob lock of {}: {}", self.entry, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transio_kv::MemoryKeyValueStore;

    fn manager(config: LockConfig) -> BlobLockManager {
        BlobLockManager::new(
            Arc::new(MemoryKeyValueStore::new()),
            KeyCodec::new("locks"),
            config,
        )
    }

    fn short_timeout() -> LockConfig {
        LockConfig {
            timeout_ms: 30,
            ..Default::default()
        }
    }

    #[test]
    fn test_acquire_release() {
        let locks = manager(LockConfig::default());
        assert!(locks.try_acquire_once("e").unwrap());
        assert!(!locks.try_acquire_once("e").unwrap());
        locks.release("e").unwrap();
        assert!(locks.try_acquire_once("e").unwrap());
    }

    #[test]
    fn test_locks_are_per_entry() {
        let locks = manager(LockConfig::default());
        assert!(locks.try_acquire_once("a").unwrap());
        assert!(locks.try_acquire_once("b").unwrap());
    }

    #[test]
    fn test_timeout() {
        let locks = manager(short_timeout());
        assert!(locks.try_acquire_once("e").unwrap());

        let start = Instant::now();
        assert!(!locks.try_acquire("e").unwrap());
        assert!(start.elapsed() >= Duration::from_millis(30));

        let err = locks.acquire_or_throw("e").unwrap_err();
        assert!(matches!(err, Error::LockTimeout { waited_ms: 30, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_expired_token_is_reacquired() {
        let locks = manager(LockConfig {
            ttl_ms: 20,
            timeout_ms: 500,
            ..Default::default()
        });
        assert!(locks.try_acquire_once("e").unwrap());
        // Never released: the TTL frees it
        assert!(locks.try_acquire("e").unwrap());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let locks = manager(short_timeout());
        {
            let _guard = locks.lock("e").unwrap();
            assert!(!locks.try_acquire_once("e").unwrap());
        }
        assert!(locks.try_acquire_once("e").unwrap());
    }

    #[test]
    fn test_best_effort_proceeds_without_lock() {
        let locks = manager(short_timeout());
        assert!(locks.try_acquire_once("e").unwrap());
        assert!(locks.lock_best_effort("e").unwrap().is_none());
        // Not taken, so dropping nothing must not free the holder's lock
        assert!(!locks.try_acquire_once("e").unwrap());
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let locks = manager(LockConfig {
            timeout_ms: 2_000,
            ..Default::default()
        });
        assert!(locks.try_acquire_once("e").unwrap());

        let waiter = {
            let locks = locks.clone();
            thread::spawn(move || locks.try_acquire("e").unwrap())
        };
        thread::sleep(Duration::from_millis(50));
        locks.release("e").unwrap();
        assert!(waiter.join().unwrap());
    }
}
