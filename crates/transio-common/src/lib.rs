//! Transio Common - Shared types and utilities
//!
//! This crate provides the error type, configuration structures, digest
//! helpers and data types shared by the key/value stores, the blob
//! providers and the transient store engine.

pub mod checksum;
pub mod config;
pub mod error;
pub mod types;

pub use checksum::Digest;
pub use config::{CasRetryConfig, LockConfig, TransientStoreConfig};
pub use error::{Error, Result};
pub use types::*;
