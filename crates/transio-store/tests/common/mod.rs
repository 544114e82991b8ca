#![allow(dead_code)]

use std::sync::Arc;
use transio_blob::MemoryBlobProvider;
use transio_common::{Blob, Digest, TransientStoreConfig};
use transio_kv::MemoryKeyValueStore;
use transio_store::TransientStore;

pub struct Fixture {
    pub store: TransientStore,
    pub kv: Arc<MemoryKeyValueStore>,
    pub provider: Arc<MemoryBlobProvider>,
}

pub fn fixture(config: TransientStoreConfig) -> Fixture {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let provider = Arc::new(MemoryBlobProvider::new(config.blob_provider_id()));
    let store = TransientStore::new(config, kv.clone(), provider.clone()).unwrap();
    Fixture { store, kv, provider }
}

pub fn default_fixture() -> Fixture {
    fixture(TransientStoreConfig::named("test"))
}

pub fn blob(content: &[u8]) -> Blob {
    Blob::new(content.to_vec())
}

pub fn provider_key(content: &[u8]) -> String {
    Digest::compute(content).to_hex()
}
