//! In-memory blob provider
//!
//! Content addressed by SHA-256. Every write stamps the blob with a fresh
//! generation number; a GC pass remembers the generation at start and only
//! sweeps blobs stamped at or before it.

use crate::gc::{BinaryGarbageCollector, GcStatus, GcTracker};
use crate::provider::BlobProvider;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};
use transio_common::{Blob, BlobRef, Digest, Error, Result};

struct StoredBlob {
    data: Bytes,
    generation: u64,
}

/// Process-local blob provider
pub struct MemoryBlobProvider {
    id: String,
    transient: bool,
    blobs: RwLock<HashMap<String, StoredBlob>>,
    generation: AtomicU64,
    gc: GcTracker<u64>,
}

impl MemoryBlobProvider {
    /// Create a transient provider
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transient: true,
            blobs: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            gc: GcTracker::new(),
        }
    }

    /// Create a provider that declares itself non-transient
    pub fn persistent(id: impl Into<String>) -> Self {
        Self {
            transient: false,
            ..Self::new(id)
        }
    }

    /// Whether bytes are stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Total stored bytes
    pub fn stored_bytes(&self) -> u64 {
        self.blobs.read().values().map(|b| b.data.len() as u64).sum()
    }
}

impl BlobProvider for MemoryBlobProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn write_blob(&self, blob: &Blob) -> Result<String> {
        let key = Digest::compute(&blob.data).to_hex();
        let mut blobs = self.blobs.write();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        blobs
            .entry(key.clone())
            .and_modify(|stored| stored.generation = generation)
            .or_insert_with(|| StoredBlob {
                data: blob.data.clone(),
                generation,
            });
        trace!("{} write_blob -> {} ({} bytes)", self.id, key, blob.length());
        Ok(key)
    }

    fn read_blob(&self, blob_ref: &BlobRef) -> Result<Blob> {
        let blobs = self.blobs.read();
        let stored = blobs.get(&blob_ref.provider_key).ok_or_else(|| Error::BlobNotFound {
            key: blob_ref.provider_key.clone(),
        })?;
        Ok(Blob::from_ref(blob_ref, stored.data.clone()))
    }

    fn garbage_collector(&self) -> &dyn BinaryGarbageCollector {
        self
    }

    fn is_transient(&self) -> bool {
        self.transient
    }
}

impl BinaryGarbageCollector for MemoryBlobProvider {
    fn id(&self) -> String {
        format!("memory:{}", self.id)
    }

    fn start(&self) -> Result<()> {
        let cutoff = self.generation.load(Ordering::SeqCst);
        self.gc.start(&self.id, cutoff)?;
        debug!("{} GC started at generation {}", self.id, cutoff);
        Ok(())
    }

    fn mark(&self, key: &str) {
        self.gc.mark(key);
    }

    fn stop(&self, delete: bool) -> Result<GcStatus> {
        let pass = self.gc.take(&self.id)?;
        let (mut kept, mut deleted, mut deleted_bytes) = (0u64, 0u64, 0u64);
        if delete {
            let mut blobs = self.blobs.write();
            blobs.retain(|key, stored| {
                if pass.keeps(key, stored.generation > pass.cutoff) {
                    kept += 1;
                    true
                } else {
                    deleted += 1;
                    deleted_bytes += stored.data.len() as u64;
                    false
                }
            });
        } else {
            kept = self.blobs.read().len() as u64;
        }
        let status = self
            .gc
            .finish(pass.into_status(kept, deleted, deleted_bytes, delete));
        debug!("{} GC stopped: {}", self.id, status);
        Ok(status)
    }

    fn is_in_progress(&self) -> bool {
        self.gc.in_progress()
    }

    fn status(&self) -> GcStatus {
        self.gc.last_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_ref(key: &str) -> BlobRef {
        BlobRef {
            provider_key: key.to_string(),
            mime_type: Some("text/plain".into()),
            encoding: None,
            filename: Some("f.txt".into()),
            length: None,
            digest: None,
        }
    }

    #[test]
    fn test_write_read() {
        let provider = MemoryBlobProvider::new("mem");
        let key = provider.write_blob(&Blob::new(b"hello".to_vec())).unwrap();
        assert_eq!(key, Digest::compute(b"hello").to_hex());

        let blob = provider.read_blob(&blob_ref(&key)).unwrap();
        assert_eq!(&blob.data[..], b"hello");
        assert_eq!(blob.filename.as_deref(), Some("f.txt"));
        assert!(provider.is_transient());
    }

    #[test]
    fn test_same_content_dedups() {
        let provider = MemoryBlobProvider::new("mem");
        let a = provider.write_blob(&Blob::new(b"same".to_vec())).unwrap();
        let b = provider.write_blob(&Blob::new(b"same".to_vec())).unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn test_read_missing() {
        let provider = MemoryBlobProvider::new("mem");
        let err = provider.read_blob(&blob_ref("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_gc_sweeps_unmarked() {
        let provider = MemoryBlobProvider::new("mem");
        let live = provider.write_blob(&Blob::new(b"live".to_vec())).unwrap();
        let dead = provider.write_blob(&Blob::new(b"dead!".to_vec())).unwrap();

        let gc = provider.garbage_collector();
        gc.start().unwrap();
        gc.mark(&live);
        let status = gc.stop(true).unwrap();

        assert!(provider.contains(&live));
        assert!(!provider.contains(&dead));
        assert_eq!(status.deleted_blobs, 1);
        assert_eq!(status.deleted_bytes, 5);
        assert_eq!(gc.status(), status);
    }

    #[test]
    fn test_gc_keeps_blobs_written_after_start() {
        let provider = MemoryBlobProvider::new("mem");
        let gc = provider.garbage_collector();
        gc.start().unwrap();
        let fresh = provider.write_blob(&Blob::new(b"fresh".to_vec())).unwrap();
        gc.stop(true).unwrap();
        assert!(provider.contains(&fresh));
    }

    #[test]
    fn test_gc_stop_without_delete_keeps_everything() {
        let provider = MemoryBlobProvider::new("mem");
        let key = provider.write_blob(&Blob::new(b"x".to_vec())).unwrap();
        let gc = provider.garbage_collector();
        gc.start().unwrap();
        let status = gc.stop(false).unwrap();
        assert!(provider.contains(&key));
        assert!(!status.swept);
        assert!(gc.stop(false).is_err());
    }
}
