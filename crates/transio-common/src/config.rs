//! Configuration types for Transio
//!
//! This module defines the configuration of a transient store: which
//! collaborators it uses, its TTL tiers, its size budgets and the tuning of
//! the lock and compare-and-set retry loops.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix given to blob provider ids derived from a store name
pub const TRANSIENT_PROVIDER_PREFIX: &str = "transient";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Configuration of one transient store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransientStoreConfig {
    /// Store name, also used as the key namespace in the key/value store
    pub name: String,
    /// Name of the key/value store in the provider registry
    pub key_value_store: String,
    /// Blob provider id; derived from the store name when unset
    pub blob_provider: Option<String>,
    /// Provider used as a template when `blob_provider` is not registered
    pub default_blob_provider: String,
    /// TTL of entries while they are being produced (minutes)
    pub first_level_ttl_minutes: u64,
    /// TTL of entries once released (minutes)
    pub second_level_ttl_minutes: u64,
    /// Soft budget: above it, released entries are removed
    pub target_max_size_mb: Option<u64>,
    /// Hard budget: above it, new blobs are rejected
    pub absolute_max_size_mb: Option<u64>,
    /// Blob lock tuning
    pub lock: LockConfig,
    /// Compare-and-set retry bound
    pub cas: CasRetryConfig,
}

impl Default for TransientStoreConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            key_value_store: "default".to_string(),
            blob_provider: None,
            default_blob_provider: "default".to_string(),
            first_level_ttl_minutes: 120,
            second_level_ttl_minutes: 10,
            target_max_size_mb: None,
            absolute_max_size_mb: None,
            lock: LockConfig::default(),
            cas: CasRetryConfig::default(),
        }
    }
}

impl TransientStoreConfig {
    /// Create a configuration with default settings for the named store
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Blob provider id, `transient_<name>` unless configured explicitly
    #[must_use]
    pub fn blob_provider_id(&self) -> String {
        match &self.blob_provider {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ if self.name.starts_with(TRANSIENT_PROVIDER_PREFIX) => self.name.clone(),
            _ => format!("{TRANSIENT_PROVIDER_PREFIX}_{}", self.name),
        }
    }

    /// TTL applied to every key of an active entry
    #[must_use]
    pub const fn first_level_ttl(&self) -> Duration {
        Duration::from_secs(self.first_level_ttl_minutes.saturating_mul(60))
    }

    /// TTL applied to every key of a released entry
    #[must_use]
    pub const fn second_level_ttl(&self) -> Duration {
        Duration::from_secs(self.second_level_ttl_minutes.saturating_mul(60))
    }

    /// Soft budget in bytes
    #[must_use]
    pub fn target_max_size(&self) -> Option<u64> {
        self.target_max_size_mb.map(|mb| mb.saturating_mul(BYTES_PER_MB))
    }

    /// Hard budget in bytes
    #[must_use]
    pub fn absolute_max_size(&self) -> Option<u64> {
        self.absolute_max_size_mb.map(|mb| mb.saturating_mul(BYTES_PER_MB))
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::configuration("store name must not be empty"));
        }
        if self.key_value_store.trim().is_empty() {
            return Err(crate::Error::configuration(
                "key/value store name must not be empty",
            ));
        }
        if self.lock.timeout_ms == 0 {
            return Err(crate::Error::configuration("lock timeout must be positive"));
        }
        for (what, minutes) in [
            ("first-level", self.first_level_ttl_minutes),
            ("second-level", self.second_level_ttl_minutes),
        ] {
            if minutes.checked_mul(60).is_none() {
                return Err(crate::Error::configuration(format!(
                    "{what} TTL of {minutes} minutes is out of range"
                )));
            }
        }
        for (what, mb) in [
            ("target", self.target_max_size_mb),
            ("absolute", self.absolute_max_size_mb),
        ] {
            if let Some(mb) = mb
                && mb.checked_mul(BYTES_PER_MB).is_none()
            {
                return Err(crate::Error::configuration(format!(
                    "{what} max size of {mb} MB is out of range"
                )));
            }
        }
        if let (Some(target), Some(absolute)) = (self.target_max_size_mb, self.absolute_max_size_mb)
            && target > absolute
        {
            return Err(crate::Error::configuration(format!(
                "target max size ({target} MB) exceeds absolute max size ({absolute} MB)"
            )));
        }
        Ok(())
    }
}

/// Advisory blob lock configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lifetime of a lock token before it expires on its own
    pub ttl_ms: u64,
    /// Hard deadline for acquisition
    pub timeout_ms: u64,
    /// Elapsed time after which the backoff starts doubling
    pub backoff_threshold_ms: u64,
    /// Upper bound of a single backoff sleep
    pub max_backoff_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            timeout_ms: 5_000,
            backoff_threshold_ms: 100,
            max_backoff_ms: 100,
        }
    }
}

impl LockConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn backoff_threshold(&self) -> Duration {
        Duration::from_millis(self.backoff_threshold_ms)
    }

    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Bound of the compare-and-set retry loop
///
/// Both limits unset means the loop retries until it wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasRetryConfig {
    /// Maximum number of CAS attempts
    pub max_attempts: Option<u32>,
    /// Maximum time spent retrying
    pub max_elapsed_ms: Option<u64>,
}

impl CasRetryConfig {
    /// Whether the loop must give up after `attempts` tries started at `elapsed`
    #[must_use]
    pub fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self
                .max_elapsed_ms
                .is_some_and(|max| elapsed >= Duration::from_millis(max))
    }
}
