//! Transio Key/Value - shared key/value store abstraction
//!
//! This crate defines the [`KeyValueStore`] capability the transient store
//! engine coordinates through, and two backends:
//! - [`MemoryKeyValueStore`]: process-local, for tests and embedding
//! - [`RedbKeyValueStore`]: persistent, backed by redb

pub mod memory;
pub mod redb_store;
pub mod store;
mod tables;

// Re-exports
pub use memory::MemoryKeyValueStore;
pub use redb_store::{RedbKeyValueStore, RedbStoreError};
pub use store::KeyValueStore;
