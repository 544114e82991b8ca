//! Transio Store - clustered transient key/value + blob store
//!
//! A transient store stages short-lived artifacts (conversion results,
//! upload state, intermediate output) in a shared key/value store and a
//! blob provider, so that every node of a cluster can read and write the
//! same logical entry.
//!
//! # Layout of an entry
//!
//! Every field of an entry lives under its own key (see [`KeyCodec`]):
//!
//! ```text
//! <store>:<entry>.completed        completion marker ("true" / "false")
//! <store>:<entry>.paramsnames      index of parameter names
//! <store>:<entry>.param.<name>     parameter value
//! <store>:<entry>.paramformat.<n>  parameter format (plain / tagged)
//! <store>:<entry>.bloblock         advisory blob lock
//! <store>:<entry>.blobinfo         blob count + total size
//! <store>:<entry>.blob.<i>         descriptor of the i-th blob
//! <store>:__blobsize__             approximate bytes used by the store
//! ```
//!
//! `<entry>` and `<name>` are percent-encoded, `.` included.
//!
//! # Coordination
//!
//! - The parameter index and the size counter are updated with
//!   compare-and-set loops ([`AtomicUpdater`]).
//! - Blob writes of one entry are serialized by a self-expiring advisory
//!   lock ([`BlobLockManager`]); readers only try it.
//! - Unreferenced blobs are reclaimed by a mark-sweep pass over the blob
//!   provider ([`GarbageCollector`]). The mark phase takes no entry lock.

pub mod accountant;
pub mod atomic;
pub mod blobs;
mod context;
pub mod gc;
pub mod keys;
pub mod lock;
pub mod params;
pub mod registry;
pub mod store;

// Re-exports
pub use accountant::StorageAccountant;
pub use atomic::AtomicUpdater;
pub use blobs::BlobStore;
pub use gc::GarbageCollector;
pub use keys::KeyCodec;
pub use lock::{BlobLockGuard, BlobLockManager};
pub use params::ParameterStore;
pub use registry::{BlobProviderFactory, ProviderRegistry};
pub use store::TransientStore;
