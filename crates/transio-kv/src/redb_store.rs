//! Persistent key/value store backed by redb.
//!
//! Each value is stored as a bincode-encoded [`StoredValue`] carrying its
//! absolute expiry time. Expired values are treated as absent by every
//! read and by compare-and-set, and are physically dropped by
//! [`KeyValueStore::expire_once`]. All writes are synchronous (write txn +
//! commit); redb serializes write transactions, which makes compare-and-set
//! atomic for every handle sharing the database.

use crate::store::KeyValueStore;
use crate::tables;
use redb::{Database, ReadableTable};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Error type for redb key/value operations
#[derive(Debug, thiserror::Error)]
pub enum RedbStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for RedbStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<RedbStoreError> for transio_common::Error {
    fn from(e: RedbStoreError) -> Self {
        match e {
            RedbStoreError::Io(e) => Self::Io(e),
            other => Self::KeyValue(other.to_string()),
        }
    }
}

pub type RedbStoreResult<T> = Result<T, RedbStoreError>;

/// Value envelope persisted in the table
#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    /// Absolute expiry, milliseconds since the Unix epoch
    expires_at_ms: Option<u64>,
    data: Vec<u8>,
}

impl StoredValue {
    fn new(data: &[u8], ttl: Option<Duration>) -> Self {
        Self {
            expires_at_ms: ttl.map(|ttl| now_ms().saturating_add(duration_ms(ttl))),
            data: data.to_vec(),
        }
    }

    fn is_live(&self, now: u64) -> bool {
        self.expires_at_ms.is_none_or(|at| at > now)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_ms)
        .unwrap_or(0)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Decode a raw table value, returning the payload if it is still live
fn live_value(key: &str, raw: &[u8], now: u64) -> Option<StoredValue> {
    match bincode::deserialize::<StoredValue>(raw) {
        Ok(value) if value.is_live(now) => Some(value),
        Ok(_) => None,
        Err(e) => {
            error!("Failed to decode value of '{}': {}", key, e);
            None
        }
    }
}

/// Persistent key/value store backed by redb.
pub struct RedbKeyValueStore {
    db: Database,
}

impl RedbKeyValueStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> RedbStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::KEY_VALUES)?;
        }
        write_txn.commit()?;

        debug!("Opened key/value store at {:?}", path);
        Ok(Self { db })
    }

    fn get_inner(&self, key: &str) -> RedbStoreResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::KEY_VALUES)?;
        let now = now_ms();
        Ok(table
            .get(key)?
            .and_then(|raw| live_value(key, raw.value(), now))
            .map(|v| v.data))
    }

    fn put_inner(
        &self,
        key: &str,
        value: Option<&[u8]>,
        ttl: Option<Duration>,
    ) -> RedbStoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(tables::KEY_VALUES)?;
            match value {
                Some(value) => {
                    let bytes = bincode::serialize(&StoredValue::new(value, ttl))?;
                    table.insert(key, bytes.as_slice())?;
                }
                None => {
                    table.remove(key)?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn compare_and_set_inner(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Option<&[u8]>,
        ttl: Option<Duration>,
    ) -> RedbStoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let swapped = {
            let mut table = write_txn.open_table(tables::KEY_VALUES)?;
            let now = now_ms();
            // Read and compare, then drop the guard before mutating
            let current = table
                .get(key)?
                .and_then(|raw| live_value(key, raw.value(), now))
                .map(|v| v.data);
            if current.as_deref() == expected {
                match value {
                    Some(value) => {
                        let bytes = bincode::serialize(&StoredValue::new(value, ttl))?;
                        table.insert(key, bytes.as_slice())?;
                    }
                    None => {
                        table.remove(key)?;
                    }
                }
                true
            } else {
                false
            }
        };
        if swapped {
            write_txn.commit()?;
        }
        Ok(swapped)
    }

    fn set_ttl_inner(&self, key: &str, ttl: Option<Duration>) -> RedbStoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(tables::KEY_VALUES)?;
            let current = table
                .get(key)?
                .and_then(|raw| live_value(key, raw.value(), now_ms()));
            match current {
                Some(value) => {
                    let bytes = bincode::serialize(&StoredValue::new(&value.data, ttl))?;
                    table.insert(key, bytes.as_slice())?;
                    true
                }
                None => false,
            }
        };
        if updated {
            write_txn.commit()?;
        }
        Ok(updated)
    }

    fn keys_inner(&self, prefix: &str) -> RedbStoreResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::KEY_VALUES)?;
        let now = now_ms();
        let mut result = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let k = entry.0.value();
            if k.starts_with(prefix) && live_value(k, entry.1.value(), now).is_some() {
                result.push(k.to_string());
            }
        }
        Ok(result)
    }

    /// Remove every key matching `doomed`.
    ///
    /// Scan and removal share one write transaction, so a key rewritten by a
    /// concurrent writer is judged on its latest value.
    fn delete_where(&self, doomed: impl Fn(&str, &[u8]) -> bool) -> RedbStoreResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(tables::KEY_VALUES)?;
            let mut keys = Vec::new();
            for entry in table.iter()? {
                let entry = entry?;
                if doomed(entry.0.value(), entry.1.value()) {
                    keys.push(entry.0.value().to_string());
                }
            }
            for key in &keys {
                table.remove(key.as_str())?;
            }
            keys.len()
        };
        if removed > 0 {
            write_txn.commit()?;
        }
        Ok(removed)
    }
}

impl KeyValueStore for RedbKeyValueStore {
    fn get(&self, key: &str) -> transio_common::Result<Option<Vec<u8>>> {
        Ok(self.get_inner(key)?)
    }

    fn put(
        &self,
        key: &str,
        value: Option<&[u8]>,
        ttl: Option<Duration>,
    ) -> transio_common::Result<()> {
        Ok(self.put_inner(key, value, ttl)?)
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Option<&[u8]>,
        ttl: Option<Duration>,
    ) -> transio_common::Result<bool> {
        Ok(self.compare_and_set_inner(key, expected, value, ttl)?)
    }

    fn set_ttl(&self, key: &str, ttl: Option<Duration>) -> transio_common::Result<bool> {
        Ok(self.set_ttl_inner(key, ttl)?)
    }

    fn keys(&self, prefix: &str) -> transio_common::Result<Vec<String>> {
        Ok(self.keys_inner(prefix)?)
    }

    fn clear(&self) -> transio_common::Result<()> {
        self.delete_where(|_, _| true)?;
        Ok(())
    }

    fn expire_once(&self) -> transio_common::Result<usize> {
        let now = now_ms();
        let purged = self.delete_where(|k, raw| live_value(k, raw, now).is_none())?;
        if purged > 0 {
            debug!("Expired {} keys", purged);
        }
        Ok(purged)
    }
}
