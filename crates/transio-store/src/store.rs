//! Transient store facade
//!
//! Ties the parameter and blob stores of one namespace together and owns
//! the entry lifecycle: an entry is active (first-level TTL) from its first
//! write until it is released, after which its keys live for the
//! second-level TTL only. Over its target budget, a release removes the
//! entry right away.

use crate::accountant::StorageAccountant;
use crate::blobs::BlobStore;
use crate::context::StoreContext;
use crate::gc::GarbageCollector;
use crate::params::ParameterStore;
use crate::registry::ProviderRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use transio_blob::{BlobProvider, GcStatus};
use transio_common::{Blob, Error, ParameterValue, Result, TransientStoreConfig};
use transio_kv::KeyValueStore;

/// A named transient store
#[derive(Clone)]
pub struct TransientStore {
    ctx: Arc<StoreContext>,
    params: ParameterStore,
    blobs: BlobStore,
    gc: GarbageCollector,
}

impl TransientStore {
    /// Build a store over explicit collaborators
    pub fn new(
        config: TransientStoreConfig,
        kv: Arc<dyn KeyValueStore>,
        provider: Arc<dyn BlobProvider>,
    ) -> Result<Self> {
        config.validate()?;
        if !provider.is_transient() {
            return Err(Error::configuration(format!(
                "blob provider {} of store {} is not transient",
                provider.id(),
                config.name
            )));
        }
        info!(
            "Initializing transient store {} (blob provider {})",
            config.name,
            provider.id()
        );
        let ctx = Arc::new(StoreContext::new(config, kv, provider));
        Ok(Self {
            params: ParameterStore::new(ctx.clone()),
            blobs: BlobStore::new(ctx.clone()),
            gc: GarbageCollector::new(ctx.clone()),
            ctx,
        })
    }

    /// Build a store resolving its collaborators by name
    pub fn from_registry(config: TransientStoreConfig, registry: &ProviderRegistry) -> Result<Self> {
        let kv = registry.key_value_store(&config.key_value_store)?;
        let provider = registry
            .blob_provider_with_namespace(&config.blob_provider_id(), &config.default_blob_provider)?;
        Self::new(config, kv, provider)
    }

    pub fn name(&self) -> &str {
        &self.ctx.config.name
    }

    pub fn config(&self) -> &TransientStoreConfig {
        &self.ctx.config
    }

    pub fn parameters(&self) -> &ParameterStore {
        &self.params
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn accountant(&self) -> &StorageAccountant {
        self.blobs.accountant()
    }

    pub fn blob_provider(&self) -> &Arc<dyn BlobProvider> {
        &self.ctx.provider
    }

    /// Whether the completion marker of `entry` is present
    pub fn exists(&self, entry: &str) -> Result<bool> {
        self.ctx.exists(entry)
    }

    /// Whether `entry` was flagged completed
    pub fn is_completed(&self, entry: &str) -> Result<bool> {
        self.ctx.is_completed(entry)
    }

    /// Flag `entry` as completed or not. Creates the entry if needed.
    pub fn set_completed(&self, entry: &str, completed: bool) -> Result<()> {
        self.ctx.set_completed(entry, completed)
    }

    /// Every live entry
    pub fn keys(&self) -> Result<Vec<String>> {
        self.ctx.entry_keys()
    }

    pub fn put_parameter(&self, entry: &str, name: &str, value: impl Into<ParameterValue>) -> Result<()> {
        self.params.put_parameter(entry, name, &value.into())
    }

    pub fn get_parameter(&self, entry: &str, name: &str) -> Result<Option<ParameterValue>> {
        self.params.get_parameter(entry, name)
    }

    pub fn put_parameters(&self, entry: &str, values: &HashMap<String, ParameterValue>) -> Result<()> {
        self.params.put_parameters(entry, values)
    }

    pub fn get_parameters(&self, entry: &str) -> Result<Option<HashMap<String, ParameterValue>>> {
        self.params.get_parameters(entry)
    }

    pub fn put_blobs(&self, entry: &str, blobs: &[Blob]) -> Result<()> {
        self.blobs.put_blobs(entry, blobs)
    }

    pub fn get_blobs(&self, entry: &str) -> Result<Option<Vec<Blob>>> {
        self.blobs.get_blobs(entry)
    }

    /// Total blob size of `entry`, if it has blobs
    pub fn get_size(&self, entry: &str) -> Result<Option<u64>> {
        self.blobs.get_size(entry)
    }

    /// Approximate bytes used by the store
    pub fn storage_size(&self) -> Result<u64> {
        self.accountant().approximate_size()
    }

    /// Recompute the storage size from the live entries
    pub fn recompute_storage_size(&self) -> Result<u64> {
        self.accountant().recompute_exact(&self.blobs)
    }

    /// Hand the entry back to the store.
    ///
    /// Over the target budget the entry is removed; otherwise every one of
    /// its keys gets the second-level TTL.
    pub fn release(&self, entry: &str) -> Result<()> {
        if !self.exists(entry)? {
            debug!("release({}): no such entry", entry);
            return Ok(());
        }
        if let Some(target) = self.ctx.config.target_max_size() {
            let mut size = self.storage_size()?;
            if size > target {
                size = self.recompute_storage_size()?;
            }
            if size > target {
                warn!(
                    "release({}): store {} at {} bytes over target {}, removing",
                    entry, self.ctx.config.name, size, target
                );
                return self.remove(entry);
            }
        }
        let ttl = self.ctx.released_ttl();
        self.ctx.kv.set_ttl(&self.ctx.keys.completed(entry), ttl)?;
        self.params.release(entry)?;
        self.blobs.release(entry)?;
        debug!("release({}): kept for {:?}", entry, ttl);
        Ok(())
    }

    /// Delete the entry with its parameters and blob descriptors. The blob
    /// bytes are reclaimed by the next GC pass.
    pub fn remove(&self, entry: &str) -> Result<()> {
        self.blobs.remove_blobs(entry)?;
        self.params.remove_parameters(entry)?;
        self.ctx.kv.put(&self.ctx.keys.completed(entry), None, None)?;
        debug!("remove({})", entry);
        Ok(())
    }

    /// Run a GC pass on the blob provider, then recompute the storage size.
    ///
    /// Returns `None` when another pass was already in progress.
    pub fn do_gc(&self) -> Result<Option<GcStatus>> {
        let status = self.gc.collect(&self.blobs)?;
        if status.is_some() {
            self.recompute_storage_size()?;
        }
        Ok(status)
    }

    /// Drop every key of the store, then collect the blobs
    pub fn remove_all(&self) -> Result<()> {
        let keys = self.ctx.kv.keys(self.ctx.keys.prefix())?;
        info!("Removing {} keys of store {}", keys.len(), self.ctx.config.name);
        for key in &keys {
            self.ctx.kv.put(key, None, None)?;
        }
        self.do_gc()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transio_blob::MemoryBlobProvider;
    use transio_kv::MemoryKeyValueStore;

    fn store_with(config: TransientStoreConfig) -> (TransientStore, Arc<MemoryKeyValueStore>) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let provider = Arc::new(MemoryBlobProvider::new(config.blob_provider_id()));
        (TransientStore::new(config, kv.clone(), provider).unwrap(), kv)
    }

    #[test]
    fn test_rejects_persistent_provider() {
        let err = TransientStore::new(
            TransientStoreConfig::named("s"),
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(MemoryBlobProvider::persistent("main")),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = TransientStore::new(
            TransientStoreConfig::named(""),
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(MemoryBlobProvider::new("transient_")),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_completion_flag() {
        let (store, _) = store_with(TransientStoreConfig::named("s"));
        store.put_parameter("e", "p", "v").unwrap();
        assert!(store.exists("e").unwrap());
        assert!(!store.is_completed("e").unwrap());

        store.set_completed("e", true).unwrap();
        assert!(store.is_completed("e").unwrap());
        store.put_parameter("e", "q", "w").unwrap();
        assert!(store.is_completed("e").unwrap());
    }

    #[test]
    fn test_keys() {
        let (store, _) = store_with(TransientStoreConfig::named("s"));
        store.put_parameter("b", "p", "v").unwrap();
        store.put_blobs("a", &[Blob::new(b"x".to_vec())]).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove() {
        let (store, kv) = store_with(TransientStoreConfig::named("s"));
        store.put_parameter("e", "p", "v").unwrap();
        store.put_blobs("e", &[Blob::new(b"data".to_vec())]).unwrap();
        store.remove("e").unwrap();

        assert!(!store.exists("e").unwrap());
        assert_eq!(store.get_parameters("e").unwrap(), None);
        assert_eq!(store.storage_size().unwrap(), 0);
        // Only the storage counter is left
        assert_eq!(kv.keys("s:").unwrap(), vec!["s:__blobsize__"]);
    }

    #[test]
    fn test_release_missing_entry_is_noop() {
        let (store, kv) = store_with(TransientStoreConfig::named("s"));
        store.release("nope").unwrap();
        assert!(kv.is_empty());
    }

    #[test]
    fn test_remove_all() {
        let (store, kv) = store_with(TransientStoreConfig::named("s"));
        store.put_blobs("a", &[Blob::new(b"1".to_vec())]).unwrap();
        store.put_parameter("b", "p", "v").unwrap();
        kv.put("other:key", Some(b"kept".as_slice()), None).unwrap();

        store.remove_all().unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(store.storage_size().unwrap(), 0);
        assert!(kv.get("other:key").unwrap().is_some());
    }

    #[test]
    fn test_from_registry() {
        let registry = ProviderRegistry::new();
        registry.register_key_value_store("default", Arc::new(MemoryKeyValueStore::new()));
        registry.register_blob_factory(
            "default",
            Box::new(|id: &str| -> Result<Arc<dyn BlobProvider>> {
                Ok(Arc::new(MemoryBlobProvider::new(id)) as Arc<dyn BlobProvider>)
            }),
        );

        let store = TransientStore::from_registry(TransientStoreConfig::named("conv"), &registry).unwrap();
        assert_eq!(store.blob_provider().id(), "transient_conv");
        store.put_parameter("e", "p", "v").unwrap();

        // A second store of the same name shares the namespace
        let other = TransientStore::from_registry(TransientStoreConfig::named("conv"), &registry).unwrap();
        assert!(Arc::ptr_eq(store.blob_provider(), other.blob_provider()));
        assert!(other.exists("e").unwrap());
    }
}
