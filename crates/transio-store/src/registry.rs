//! Provider registry
//!
//! Maps names to key/value stores and ids to blob providers. Blob providers
//! missing from the registry can be derived from a registered factory, which
//! builds a provider for a namespace (typically `transient_<store>`).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use transio_blob::BlobProvider;
use transio_common::{Error, Result};
use transio_kv::KeyValueStore;

/// Builds a blob provider for the given namespace id
pub type BlobProviderFactory = Box<dyn Fn(&str) -> Result<Arc<dyn BlobProvider>> + Send + Sync>;

#[derive(Default)]
pub struct ProviderRegistry {
    key_value_stores: RwLock<HashMap<String, Arc<dyn KeyValueStore>>>,
    blob_providers: RwLock<HashMap<String, Arc<dyn BlobProvider>>>,
    blob_factories: RwLock<HashMap<String, BlobProviderFactory>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_key_value_store(&self, name: impl Into<String>, store: Arc<dyn KeyValueStore>) {
        let name = name.into();
        debug!("Registered key/value store {}", name);
        self.key_value_stores.write().insert(name, store);
    }

    pub fn key_value_store(&self, name: &str) -> Result<Arc<dyn KeyValueStore>> {
        self.key_value_stores
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(format!("key/value store {name}")))
    }

    /// Register a provider under its own id
    pub fn register_blob_provider(&self, provider: Arc<dyn BlobProvider>) {
        let id = provider.id().to_string();
        debug!("Registered blob provider {}", id);
        self.blob_providers.write().insert(id, provider);
    }

    pub fn register_blob_factory(&self, name: impl Into<String>, factory: BlobProviderFactory) {
        self.blob_factories.write().insert(name.into(), factory);
    }

    pub fn blob_provider(&self, id: &str) -> Option<Arc<dyn BlobProvider>> {
        self.blob_providers.read().get(id).cloned()
    }

    /// Provider `id`, creating it from the factory `default_id` when it is
    /// not registered yet. Created providers are registered for later calls.
    pub fn blob_provider_with_namespace(
        &self,
        id: &str,
        default_id: &str,
    ) -> Result<Arc<dyn BlobProvider>> {
        if let Some(provider) = self.blob_provider(id) {
            return Ok(provider);
        }
        let factories = self.blob_factories.read();
        let factory = factories
            .get(default_id)
            .ok_or_else(|| Error::UnknownProvider(format!("blob provider {id} (default {default_id})")))?;

        let mut providers = self.blob_providers.write();
        // Raced with another caller
        if let Some(provider) = providers.get(id) {
            return Ok(provider.clone());
        }
        let provider = factory(id)?;
        info!("Created blob provider {} from {}", id, default_id);
        providers.insert(id.to_string(), provider.clone());
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use transio_blob::MemoryBlobProvider;
    use transio_kv::MemoryKeyValueStore;

    #[test]
    fn test_key_value_stores() {
        let registry = ProviderRegistry::new();
        registry.register_key_value_store("default", Arc::new(MemoryKeyValueStore::new()));
        assert!(registry.key_value_store("default").is_ok());

        let err = registry.key_value_store("other").err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_registered_provider_wins() {
        let registry = ProviderRegistry::new();
        registry.register_blob_provider(Arc::new(MemoryBlobProvider::new("transient_a")));
        let provider = registry
            .blob_provider_with_namespace("transient_a", "default")
            .unwrap();
        assert_eq!(provider.id(), "transient_a");
    }

    #[test]
    fn test_namespace_created_once_from_factory() {
        let registry = ProviderRegistry::new();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        registry.register_blob_factory(
            "default",
            Box::new(move |id: &str| -> Result<Arc<dyn BlobProvider>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemoryBlobProvider::new(id)) as Arc<dyn BlobProvider>)
            }),
        );

        let a = registry
            .blob_provider_with_namespace("transient_x", "default")
            .unwrap();
        let b = registry
            .blob_provider_with_namespace("transient_x", "default")
            .unwrap();
        assert_eq!(a.id(), "transient_x");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(registry.blob_provider("transient_x").is_some());
    }

    #[test]
    fn test_unknown_factory() {
        let registry = ProviderRegistry::new();
        let err = registry
            .blob_provider_with_namespace("transient_x", "missing")
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownProvider(_)));
    }
}
