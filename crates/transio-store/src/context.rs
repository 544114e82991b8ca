//! State shared by the components of one store.

use crate::atomic::AtomicUpdater;
use crate::keys::KeyCodec;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use transio_blob::BlobProvider;
use transio_common::{Result, TransientStoreConfig};
use transio_kv::KeyValueStore;

const COMPLETED: &[u8] = b"true";
const NOT_COMPLETED: &[u8] = b"false";

pub(crate) struct StoreContext {
    pub config: TransientStoreConfig,
    pub keys: KeyCodec,
    pub kv: Arc<dyn KeyValueStore>,
    pub provider: Arc<dyn BlobProvider>,
    pub updater: AtomicUpdater,
}

impl StoreContext {
    pub fn new(
        config: TransientStoreConfig,
        kv: Arc<dyn KeyValueStore>,
        provider: Arc<dyn BlobProvider>,
    ) -> Self {
        Self {
            keys: KeyCodec::new(&config.name),
            updater: AtomicUpdater::new(kv.clone(), config.cas.clone()),
            config,
            kv,
            provider,
        }
    }

    /// TTL of every key written for an active entry
    pub fn active_ttl(&self) -> Option<Duration> {
        Some(self.config.first_level_ttl())
    }

    /// TTL of every key of a released entry
    pub fn released_ttl(&self) -> Option<Duration> {
        Some(self.config.second_level_ttl())
    }

    pub fn exists(&self, entry: &str) -> Result<bool> {
        Ok(self.kv.get(&self.keys.completed(entry))?.is_some())
    }

    pub fn is_completed(&self, entry: &str) -> Result<bool> {
        Ok(self.kv.get(&self.keys.completed(entry))?.as_deref() == Some(COMPLETED))
    }

    pub fn set_completed(&self, entry: &str, completed: bool) -> Result<()> {
        let value = if completed { COMPLETED } else { NOT_COMPLETED };
        self.kv
            .put(&self.keys.completed(entry), Some(value), self.active_ttl())
    }

    /// Create the completion marker if absent, otherwise bring its TTL back
    /// to the active level.
    pub fn mark_entry_exists(&self, entry: &str) -> Result<()> {
        let key = self.keys.completed(entry);
        let created = self
            .kv
            .compare_and_set(&key, None, Some(NOT_COMPLETED), self.active_ttl())?;
        if created {
            trace!("{} created", key);
        } else {
            self.kv.set_ttl(&key, self.active_ttl())?;
        }
        Ok(())
    }

    /// Every entry with a live completion marker, sorted
    pub fn entry_keys(&self) -> Result<Vec<String>> {
        let mut entries: Vec<String> = self
            .kv
            .keys(self.keys.prefix())?
            .iter()
            .filter_map(|key| self.keys.entry_of_completed(key))
            .collect();
        entries.sort();
        Ok(entries)
    }
}
