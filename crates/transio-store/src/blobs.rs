//! Entry blobs
//!
//! Blob bytes go to the blob provider; the store keeps one descriptor per
//! blob (`<entry>.blob.<i>`) plus an aggregate (`<entry>.blobinfo`) holding
//! the count and total size. Writers replace the whole set under the blob
//! lock of the entry, so readers see one writer's set or the other's.

use crate::accountant::StorageAccountant;
use crate::context::StoreContext;
use crate::lock::BlobLockManager;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use transio_blob::BlobProvider;
use transio_common::{Blob, BlobInfo, BlobRef, Digest, Error, Result};
use transio_kv::KeyValueStore;

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))
}

/// Blob sets of the entries of one store
#[derive(Clone)]
pub struct BlobStore {
    ctx: Arc<StoreContext>,
    locks: BlobLockManager,
    accountant: StorageAccountant,
}

impl BlobStore {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self {
            locks: BlobLockManager::new(
                ctx.kv.clone(),
                ctx.keys.clone(),
                ctx.config.lock.clone(),
            ),
            accountant: StorageAccountant::new(ctx.clone()),
            ctx,
        }
    }

    /// Lock manager guarding the blob sets
    pub fn locks(&self) -> &BlobLockManager {
        &self.locks
    }

    pub fn accountant(&self) -> &StorageAccountant {
        &self.accountant
    }

    /// Aggregate of `entry`. A corrupt aggregate is logged and reads as absent.
    pub fn blob_info(&self, entry: &str) -> Result<Option<BlobInfo>> {
        let Some(bytes) = self.ctx.kv.get(&self.ctx.keys.blob_info(entry))? else {
            return Ok(None);
        };
        match bincode::deserialize(&bytes) {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                warn!("Ignoring corrupt blob info of {}: {}", entry, e);
                Ok(None)
            }
        }
    }

    /// Descriptors of `entry`, stopping at the first missing or corrupt one
    fn blob_refs(&self, entry: &str) -> Result<Vec<BlobRef>> {
        let Some(info) = self.blob_info(entry)? else {
            return Ok(Vec::new());
        };
        let mut refs = Vec::with_capacity(info.count as usize);
        for index in 0..info.count {
            let key = self.ctx.keys.blob(entry, index);
            let Some(bytes) = self.ctx.kv.get(&key)? else {
                warn!("Missing blob descriptor {}, truncating to {} blobs", key, index);
                break;
            };
            match bincode::deserialize(&bytes) {
                Ok(blob_ref) => refs.push(blob_ref),
                Err(e) => {
                    warn!("Corrupt blob descriptor {} ({}), truncating to {} blobs", key, e, index);
                    break;
                }
            }
        }
        Ok(refs)
    }

    /// Provider keys referenced by `entry`. Takes no lock.
    pub fn get_blob_keys(&self, entry: &str) -> Result<Vec<String>> {
        Ok(self
            .blob_refs(entry)?
            .into_iter()
            .map(|r| r.provider_key)
            .collect())
    }

    /// Reject a write when the store is over its absolute budget, after
    /// giving the approximate counter one chance to be corrected.
    fn check_capacity(&self) -> Result<()> {
        let Some(limit) = self.ctx.config.absolute_max_size() else {
            return Ok(());
        };
        if self.accountant.approximate_size()? <= limit {
            return Ok(());
        }
        let size = self.accountant.recompute_exact(self)?;
        if size > limit {
            return Err(Error::MaximumSpaceExceeded { size, limit });
        }
        Ok(())
    }

    /// Replace the blob set of `entry`.
    ///
    /// Bytes are written to the provider before the lock is taken; only the
    /// descriptor swap happens under it.
    pub fn put_blobs(&self, entry: &str, blobs: &[Blob]) -> Result<()> {
        self.check_capacity()?;

        let mut refs = Vec::with_capacity(blobs.len());
        let mut total_size = 0u64;
        for blob in blobs {
            let key = self.ctx.provider.write_blob(blob)?;
            let mut blob_ref = BlobRef::describe(key, blob);
            if blob_ref.digest.is_none() {
                blob_ref.digest = Some(Digest::compute(&blob.data).to_hex());
            }
            total_size += blob.length();
            refs.push(blob_ref);
        }
        let info = BlobInfo {
            count: u32::try_from(refs.len())
                .map_err(|_| Error::internal("too many blobs for one entry"))?,
            total_size,
        };

        let _guard = self.locks.lock(entry)?;
        self.remove_blobs_locked(entry)?;
        let ttl = self.ctx.active_ttl();
        for (index, blob_ref) in (0u32..).zip(&refs) {
            self.ctx.kv.put(
                &self.ctx.keys.blob(entry, index),
                Some(encode(blob_ref)?.as_slice()),
                ttl,
            )?;
        }
        self.ctx.kv.put(
            &self.ctx.keys.blob_info(entry),
            Some(encode(&info)?.as_slice()),
            ttl,
        )?;
        self.accountant
            .add_delta(i64::try_from(total_size).unwrap_or(i64::MAX))?;
        self.ctx.mark_entry_exists(entry)?;
        debug!("put_blobs({}): {} blobs, {} bytes", entry, info.count, total_size);
        Ok(())
    }

    /// Blobs of `entry`; `None` when the entry does not exist.
    ///
    /// The blob lock is only tried: on timeout the read proceeds unlocked.
    /// Blobs the provider cannot return are logged and left out.
    pub fn get_blobs(&self, entry: &str) -> Result<Option<Vec<Blob>>> {
        if !self.ctx.exists(entry)? {
            return Ok(None);
        }
        let _guard = self.locks.lock_best_effort(entry)?;
        let mut blobs = Vec::new();
        for blob_ref in self.blob_refs(entry)? {
            match self.ctx.provider.read_blob(&blob_ref) {
                Ok(blob) => blobs.push(blob),
                Err(e) => warn!(
                    "Skipping unreadable blob {} of {}: {}",
                    blob_ref.provider_key, entry, e
                ),
            }
        }
        trace!("get_blobs({}) -> {} blobs", entry, blobs.len());
        Ok(Some(blobs))
    }

    /// Total size of the blobs of `entry`, if it has any
    pub fn get_size(&self, entry: &str) -> Result<Option<u64>> {
        Ok(self.blob_info(entry)?.map(|info| info.total_size))
    }

    /// Delete the blob set of `entry` under its blob lock
    pub fn remove_blobs(&self, entry: &str) -> Result<()> {
        let _guard = self.locks.lock(entry)?;
        self.remove_blobs_locked(entry)
    }

    fn remove_blobs_locked(&self, entry: &str) -> Result<()> {
        let info_key = self.ctx.keys.blob_info(entry);
        if self.ctx.kv.get(&info_key)?.is_none() {
            return Ok(());
        }
        match self.blob_info(entry)? {
            Some(info) => {
                for index in 0..info.count {
                    self.ctx.kv.put(&self.ctx.keys.blob(entry, index), None, None)?;
                }
                self.accountant
                    .add_delta(-i64::try_from(info.total_size).unwrap_or(i64::MAX))?;
            }
            None => {
                // Unreadable aggregate: drop whatever descriptors exist
                let prefix = self.ctx.keys.blob_prefix(entry);
                for key in self.ctx.kv.keys(&prefix)? {
                    let is_descriptor = key[prefix.len()..].bytes().all(|b| b.is_ascii_digit());
                    if is_descriptor {
                        self.ctx.kv.put(&key, None, None)?;
                    }
                }
            }
        }
        self.ctx.kv.put(&info_key, None, None)
    }

    /// Give the blob keys of `entry` the released TTL
    pub(crate) fn release(&self, entry: &str) -> Result<()> {
        let ttl = self.ctx.released_ttl();
        if let Some(info) = self.blob_info(entry)? {
            for index in 0..info.count {
                self.ctx.kv.set_ttl(&self.ctx.keys.blob(entry, index), ttl)?;
            }
        }
        self.ctx.kv.set_ttl(&self.ctx.keys.blob_info(entry), ttl)?;
        Ok(())
    }
}
