//! Approximate storage accounting
//!
//! A store-wide counter of the bytes referenced by its entries, kept as
//! decimal text and adjusted by compare-and-set deltas. It drifts when
//! entries expire without being removed; [`StorageAccountant::recompute_exact`]
//! resets it from the live entries.

use crate::blobs::BlobStore;
use crate::context::StoreContext;
use std::sync::Arc;
use tracing::{debug, warn};
use transio_common::Result;
use transio_kv::KeyValueStore;

#[derive(Clone)]
pub struct StorageAccountant {
    ctx: Arc<StoreContext>,
}

impl StorageAccountant {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    fn parse(&self, bytes: &[u8]) -> i64 {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or_else(|| {
                warn!("Resetting corrupt storage size of {}", self.ctx.config.name);
                0
            })
    }

    /// Add `delta` (possibly negative) to the counter
    pub fn add_delta(&self, delta: i64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        self.ctx
            .updater
            .update(&self.ctx.keys.storage_size(), None, |old| {
                let current = old.map_or(0, |bytes| self.parse(bytes));
                Ok(Some(current.saturating_add(delta).to_string().into_bytes()))
            })
    }

    /// Current counter value; never negative
    pub fn approximate_size(&self) -> Result<u64> {
        let current = self
            .ctx
            .kv
            .get(&self.ctx.keys.storage_size())?
            .map_or(0, |bytes| self.parse(&bytes));
        Ok(u64::try_from(current).unwrap_or(0))
    }

    fn set(&self, size: u64) -> Result<()> {
        self.ctx.kv.put(
            &self.ctx.keys.storage_size(),
            Some(size.to_string().as_bytes()),
            None,
        )
    }

    /// Sum the readable blobs of every live entry and overwrite the counter
    pub fn recompute_exact(&self, blobs: &BlobStore) -> Result<u64> {
        let mut total = 0u64;
        for entry in self.ctx.entry_keys()? {
            if let Some(entry_blobs) = blobs.get_blobs(&entry)? {
                total += entry_blobs.iter().map(|b| b.length()).sum::<u64>();
            }
        }
        self.set(total)?;
        debug!("Storage size of {} recomputed: {} bytes", self.ctx.config.name, total);
        Ok(total)
    }
}
