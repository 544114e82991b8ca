//! Mark-sweep garbage collection over a provider namespace
//!
//! A pass is opened with [`BinaryGarbageCollector::start`], every live key is
//! reported with [`BinaryGarbageCollector::mark`], and the pass is closed with
//! [`BinaryGarbageCollector::stop`]. When `delete` is true, unmarked blobs
//! written before the pass started are deleted. Blobs written after the start
//! are always kept, so writers racing with the mark phase are not swept by
//! that pass.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::trace;
use transio_common::{Error, Result};

/// Outcome of a GC pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcStatus {
    /// Distinct keys marked live
    pub marked: u64,
    /// Blobs kept (marked, or written after the start)
    pub kept_blobs: u64,
    /// Blobs deleted
    pub deleted_blobs: u64,
    /// Bytes reclaimed
    pub deleted_bytes: u64,
    /// Whether the sweep ran
    pub swept: bool,
    /// Wall time from start to stop
    pub duration: Duration,
}

impl GcStatus {
    /// Duration in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for GcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "marked={} kept={} deleted={} ({} bytes) swept={} in {}ms",
            self.marked,
            self.kept_blobs,
            self.deleted_blobs,
            self.deleted_bytes,
            self.swept,
            self.duration_ms()
        )
    }
}

/// Mark-sweep collector of a blob provider
pub trait BinaryGarbageCollector: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> String;

    /// Open a pass. Fails if one is already in progress.
    fn start(&self) -> Result<()>;

    /// Report a key as live. Ignored outside of a pass.
    fn mark(&self, key: &str);

    /// Close the pass, deleting unmarked blobs if `delete` is true
    fn stop(&self, delete: bool) -> Result<GcStatus>;

    /// Whether a pass is open
    fn is_in_progress(&self) -> bool;

    /// Status of the last completed pass
    fn status(&self) -> GcStatus;
}

/// An open pass: the provider-specific cutoff plus the marked keys
pub(crate) struct GcPass<C> {
    pub cutoff: C,
    pub marked: HashSet<String>,
    pub started: Instant,
}

impl<C> GcPass<C> {
    /// Whether `key` survives the sweep, given whether it was written after
    /// the cutoff
    pub fn keeps(&self, key: &str, written_after_cutoff: bool) -> bool {
        written_after_cutoff || self.marked.contains(key)
    }

    pub fn into_status(self, kept: u64, deleted: u64, deleted_bytes: u64, swept: bool) -> GcStatus {
        GcStatus {
            marked: self.marked.len() as u64,
            kept_blobs: kept,
            deleted_blobs: deleted,
            deleted_bytes,
            swept,
            duration: self.started.elapsed(),
        }
    }
}

/// Pass bookkeeping shared by the providers
pub(crate) struct GcTracker<C> {
    pass: Mutex<Option<GcPass<C>>>,
    last: Mutex<GcStatus>,
}

impl<C> GcTracker<C> {
    pub fn new() -> Self {
        Self {
            pass: Mutex::new(None),
            last: Mutex::new(GcStatus::default()),
        }
    }

    pub fn start(&self, id: &str, cutoff: C) -> Result<()> {
        let mut pass = self.pass.lock();
        if pass.is_some() {
            return Err(Error::blob_provider(format!(
                "GC already in progress on {id}"
            )));
        }
        *pass = Some(GcPass {
            cutoff,
            marked: HashSet::new(),
            started: Instant::now(),
        });
        Ok(())
    }

    pub fn mark(&self, key: &str) {
        match self.pass.lock().as_mut() {
            Some(pass) => {
                pass.marked.insert(key.to_string());
            }
            None => trace!("mark({}) outside of a GC pass", key),
        }
    }

    pub fn take(&self, id: &str) -> Result<GcPass<C>> {
        self.pass
            .lock()
            .take()
            .ok_or_else(|| Error::blob_provider(format!("no GC in progress on {id}")))
    }

    pub fn finish(&self, status: GcStatus) -> GcStatus {
        *self.last.lock() = status.clone();
        status
    }

    pub fn in_progress(&self) -> bool {
        self.pass.lock().is_some()
    }

    pub fn last_status(&self) -> GcStatus {
        self.last.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_lifecycle() {
        let tracker = GcTracker::<u64>::new();
        assert!(!tracker.in_progress());
        tracker.mark("ignored");

        tracker.start("p", 7).unwrap();
        assert!(tracker.in_progress());
        assert!(tracker.start("p", 8).is_err());

        tracker.mark("a");
        tracker.mark("a");
        let pass = tracker.take("p").unwrap();
        assert_eq!(pass.cutoff, 7);
        assert!(pass.keeps("a", false));
        assert!(pass.keeps("b", true));
        assert!(!pass.keeps("b", false));
        assert!(!tracker.in_progress());
        assert!(tracker.take("p").is_err());

        let status = tracker.finish(pass.into_status(1, 2, 30, true));
        assert_eq!(status.marked, 1);
        assert_eq!(tracker.last_status().deleted_bytes, 30);
    }
}
