//! The blob provider capability.

use crate::gc::BinaryGarbageCollector;
use transio_common::{Blob, BlobRef, Result};

/// External byte storage addressed by opaque provider keys.
pub trait BlobProvider: Send + Sync {
    /// Provider id, as registered
    fn id(&self) -> &str;

    /// Store the bytes of `blob`, returning the key to read them back with
    fn write_blob(&self, blob: &Blob) -> Result<String>;

    /// Read the bytes described by `blob_ref`.
    ///
    /// Fails with [`transio_common::Error::BlobNotFound`] when the bytes were
    /// reclaimed.
    fn read_blob(&self, blob_ref: &BlobRef) -> Result<Blob>;

    /// Mark-sweep collector over this provider's namespace
    fn garbage_collector(&self) -> &dyn BinaryGarbageCollector;

    /// Whether the provider only holds short-lived data and may be swept
    /// by a transient store
    fn is_transient(&self) -> bool;
}
