//! Transio Blob - blob provider abstraction
//!
//! This crate defines the [`BlobProvider`] capability used to store the
//! bytes attached to transient entries, its mark-sweep
//! [`BinaryGarbageCollector`], and two content-addressed providers:
//! - [`MemoryBlobProvider`]: process-local, for tests and embedding
//! - [`FileBlobProvider`]: files under a namespace directory

pub mod file;
pub mod gc;
pub mod memory;
pub mod provider;

// Re-exports
pub use file::FileBlobProvider;
pub use gc::{BinaryGarbageCollector, GcStatus};
pub use memory::MemoryBlobProvider;
pub use provider::BlobProvider;
