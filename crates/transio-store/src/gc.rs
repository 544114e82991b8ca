//! Store-driven blob garbage collection
//!
//! Marks the provider keys referenced by every live entry, then lets the
//! provider sweep the rest. The mark phase takes no entry lock: a writer
//! whose descriptors land after its entry was visited relies on the
//! provider keeping blobs written after the pass started.

use crate::blobs::BlobStore;
use crate::context::StoreContext;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use transio_blob::{BinaryGarbageCollector, BlobProvider, GcStatus};
use transio_common::Result;

/// Passes slower than this are reported
pub const SLOW_GC_THRESHOLD: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct GarbageCollector {
    ctx: Arc<StoreContext>,
}

impl GarbageCollector {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    fn mark(&self, blobs: &BlobStore, gc: &dyn BinaryGarbageCollector) -> Result<u64> {
        let mut marked = 0u64;
        for entry in self.ctx.entry_keys()? {
            for key in blobs.get_blob_keys(&entry)? {
                gc.mark(&key);
                marked += 1;
            }
        }
        Ok(marked)
    }

    /// Run one mark-sweep pass.
    ///
    /// Returns `None` without doing anything when the provider already has a
    /// pass in progress. If marking fails the pass is closed without
    /// deleting and the error is returned.
    pub fn collect(&self, blobs: &BlobStore) -> Result<Option<GcStatus>> {
        let gc = self.ctx.provider.garbage_collector();
        if gc.is_in_progress() {
            info!("GC already in progress on {}, skipping", gc.id());
            return Ok(None);
        }

        let start = Instant::now();
        debug!("Starting GC on store {}, provider {}", self.ctx.config.name, gc.id());
        gc.start()?;
        let marked = self.mark(blobs, gc);
        if let Err(e) = &marked {
            warn!(
                "GC mark phase on store {} failed, closing pass without sweeping: {}",
                self.ctx.config.name, e
            );
        }
        let status = gc.stop(marked.is_ok())?;
        let marked = marked?;

        let elapsed = start.elapsed();
        if elapsed > SLOW_GC_THRESHOLD {
            warn!(
                "GC on store {} took {}s: {}",
                self.ctx.config.name,
                elapsed.as_secs(),
                status
            );
        } else {
            debug!(
                "GC on store {} done, {} references marked: {}",
                self.ctx.config.name, marked, status
            );
        }
        Ok(Some(status))
    }
}
