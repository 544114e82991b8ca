//! Entry lifecycle over in-memory collaborators

mod common;

use common::{blob, default_fixture, fixture, provider_key};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use transio_blob::MemoryBlobProvider;
use transio_common::{Error, ParameterValue, TransientStoreConfig};
use transio_kv::KeyValueStore;
use transio_store::TransientStore;

#[test]
fn test_exists_follows_marker() {
    let f = default_fixture();
    assert!(!f.store.exists("e").unwrap());

    f.store.put_parameter("e", "p", "v").unwrap();
    assert!(f.store.exists("e").unwrap());

    // Entry data without its marker is not an entry
    f.kv.put("test:e.completed", None, None).unwrap();
    assert!(!f.store.exists("e").unwrap());
    assert_eq!(f.store.get_parameters("e").unwrap(), None);
    assert_eq!(f.store.get_blobs("e").unwrap(), None);
}

#[test]
fn test_parameter_round_trips() {
    let f = default_fixture();
    let mut nested = BTreeMap::new();
    nested.insert("pages".to_string(), ParameterValue::Integer(12));
    nested.insert("ratio".to_string(), ParameterValue::Float(0.25));

    let values = [
        ("text", ParameterValue::from("hello world")),
        ("empty", ParameterValue::from("")),
        ("int", ParameterValue::from(-7i64)),
        ("flag", ParameterValue::from(true)),
        ("raw", ParameterValue::from(vec![0u8, 1, 2, 255])),
        ("map", ParameterValue::Map(nested)),
    ];
    for (name, value) in &values {
        f.store.put_parameter("e", name, value.clone()).unwrap();
    }
    for (name, value) in &values {
        assert_eq!(f.store.get_parameter("e", name).unwrap().as_ref(), Some(value));
    }

    let all = f.store.get_parameters("e").unwrap().unwrap();
    assert_eq!(all.len(), values.len());
}

#[test]
fn test_get_parameters_missing_vs_empty() {
    let f = default_fixture();
    assert_eq!(f.store.get_parameters("e").unwrap(), None);

    f.store.put_blobs("e", &[blob(b"only blobs")]).unwrap();
    assert_eq!(f.store.get_parameters("e").unwrap(), Some(HashMap::new()));
}

#[test]
fn test_blob_round_trip() {
    let f = default_fixture();
    let input = vec![
        blob(b"%PDF-1.7").with_mime_type("application/pdf").with_filename("doc.pdf"),
        blob(b"<html/>")
            .with_mime_type("text/html")
            .with_encoding("UTF-8")
            .with_digest("caller-digest"),
    ];
    f.store.put_blobs("e", &input).unwrap();

    let output = f.store.get_blobs("e").unwrap().unwrap();
    assert_eq!(output.len(), 2);
    assert_eq!(output[0].data, input[0].data);
    assert_eq!(output[0].mime_type, input[0].mime_type);
    assert_eq!(output[0].filename, input[0].filename);
    assert_eq!(output[0].digest, Some(provider_key(b"%PDF-1.7")));
    assert_eq!(output[1].encoding.as_deref(), Some("UTF-8"));
    assert_eq!(output[1].digest.as_deref(), Some("caller-digest"));
    assert_eq!(f.store.get_size("e").unwrap(), Some(15));
}

#[test]
fn test_size_accounting() {
    let f = default_fixture();
    f.store.put_blobs("a", &[blob(&[1u8; 100])]).unwrap();
    f.store.put_blobs("b", &[blob(&[2u8; 50]), blob(&[3u8; 25])]).unwrap();
    f.store.put_blobs("a", &[blob(&[4u8; 10])]).unwrap();
    assert_eq!(f.store.storage_size().unwrap(), 85);

    f.store.remove("b").unwrap();
    assert_eq!(f.store.storage_size().unwrap(), 10);
    assert_eq!(f.store.recompute_storage_size().unwrap(), 10);
}

#[test]
fn test_release_under_target_keeps_entry_for_second_ttl() {
    let f = fixture(TransientStoreConfig {
        second_level_ttl_minutes: 0,
        ..TransientStoreConfig::named("test")
    });
    f.store.put_parameter("e", "p", "v").unwrap();
    f.store.put_blobs("e", &[blob(b"data")]).unwrap();
    f.store.put_parameter("other", "p", "v").unwrap();

    f.store.release("e").unwrap();

    // Zero second-level TTL: every key of the entry is already gone
    assert!(!f.store.exists("e").unwrap());
    assert!(f.kv.keys("test:e.").unwrap().is_empty());
    assert!(f.store.exists("other").unwrap());
}

#[test]
fn test_rewrite_after_release_keeps_index_alive() {
    let f = default_fixture();
    f.store.put_parameter("e", "p", "v1").unwrap();
    // What release does to the index, with a short TTL
    f.kv.set_ttl("test:e.paramsnames", Some(Duration::from_millis(50)))
        .unwrap();

    f.store.put_parameter("e", "p", "v2").unwrap();
    thread::sleep(Duration::from_millis(100));

    let params = f.store.get_parameters("e").unwrap().unwrap();
    assert_eq!(params.get("p"), Some(&ParameterValue::from("v2")));

    f.store.remove("e").unwrap();
    assert!(f.kv.keys("test:e.").unwrap().is_empty());
}

#[test]
fn test_dotted_names_do_not_create_entries() {
    let f = default_fixture();
    f.store.put_parameter("job", "step.completed", "yes").unwrap();
    f.store.put_parameter("job", "completed", "yes").unwrap();
    f.store.put_parameter("a.b", "p", "v").unwrap();

    assert_eq!(f.store.keys().unwrap(), vec!["a.b", "job"]);
    assert!(!f.store.exists("job.param.step").unwrap());
    assert!(!f.store.exists("job.param").unwrap());
    assert_eq!(
        f.store.get_parameter("job", "step.completed").unwrap(),
        Some(ParameterValue::from("yes"))
    );
    assert_eq!(f.store.get_parameters("a.b").unwrap().unwrap().len(), 1);
}

#[test]
fn test_release_keeps_entry_readable() {
    let f = default_fixture();
    f.store.put_parameter("e", "p", "v").unwrap();
    f.store.put_blobs("e", &[blob(b"data")]).unwrap();
    f.store.release("e").unwrap();

    assert_eq!(
        f.store.get_parameter("e", "p").unwrap(),
        Some(ParameterValue::from("v"))
    );
    assert_eq!(f.store.get_blobs("e").unwrap().unwrap().len(), 1);
    assert_eq!(f.store.storage_size().unwrap(), 4);
}

#[test]
fn test_release_over_target_removes_entry() {
    let f = fixture(TransientStoreConfig {
        target_max_size_mb: Some(1),
        ..TransientStoreConfig::named("test")
    });
    f.store.put_parameter("e", "p", "v").unwrap();
    f.store.put_blobs("e", &[blob(&vec![0u8; 1024 * 1024 + 1])]).unwrap();

    f.store.release("e").unwrap();
    assert!(!f.store.exists("e").unwrap());
    assert_eq!(f.store.get_parameters("e").unwrap(), None);
    assert_eq!(f.store.storage_size().unwrap(), 0);
}

#[test]
fn test_release_with_stale_counter_keeps_entry() {
    let f = fixture(TransientStoreConfig {
        target_max_size_mb: Some(1),
        ..TransientStoreConfig::named("test")
    });
    f.store.put_blobs("e", &[blob(b"small")]).unwrap();
    f.kv.put("test:__blobsize__", Some(b"999999999".as_slice()), None)
        .unwrap();

    f.store.release("e").unwrap();
    assert!(f.store.exists("e").unwrap());
    assert_eq!(f.store.storage_size().unwrap(), 5);
}

#[test]
fn test_gc_reclaims_removed_blobs() {
    let f = default_fixture();
    f.store.put_blobs("x", &[blob(b"X")]).unwrap();
    f.store.put_blobs("y", &[blob(b"Y")]).unwrap();
    f.store.remove("x").unwrap();

    let status = f.store.do_gc().unwrap().unwrap();
    assert_eq!(status.deleted_blobs, 1);
    assert!(!f.provider.contains(&provider_key(b"X")));
    assert!(f.provider.contains(&provider_key(b"Y")));
    assert_eq!(f.store.get_blobs("y").unwrap().unwrap().len(), 1);
    assert_eq!(f.store.storage_size().unwrap(), 1);
}

#[test]
fn test_gc_reclaims_expired_entries() {
    let f = fixture(TransientStoreConfig {
        second_level_ttl_minutes: 0,
        ..TransientStoreConfig::named("test")
    });
    f.store.put_blobs("x", &[blob(b"expired")]).unwrap();
    f.store.release("x").unwrap();
    // The counter still holds the released bytes
    assert_eq!(f.store.storage_size().unwrap(), 7);

    f.store.do_gc().unwrap();
    assert!(f.provider.is_empty());
    assert_eq!(f.store.storage_size().unwrap(), 0);
}

#[test]
fn test_capacity_exceeded() {
    let f = fixture(TransientStoreConfig {
        absolute_max_size_mb: Some(1),
        ..TransientStoreConfig::named("test")
    });
    f.store.put_blobs("a", &[blob(&vec![0u8; 1024 * 1024 + 10])]).unwrap();

    let err = f.store.put_blobs("b", &[blob(b"more")]).unwrap_err();
    assert!(matches!(err, Error::MaximumSpaceExceeded { limit, .. } if limit == 1024 * 1024));
    assert!(!f.store.exists("b").unwrap());

    // Freeing space lets writes through again
    f.store.remove("a").unwrap();
    f.store.put_blobs("b", &[blob(b"more")]).unwrap();
}

#[test]
fn test_corrupt_descriptor_truncates_blobs() {
    let f = default_fixture();
    f.store
        .put_blobs("e", &[blob(b"one"), blob(b"two"), blob(b"three")])
        .unwrap();
    f.kv
        .put("test:e.blob.2", Some(b"not a descriptor".as_slice()), None)
        .unwrap();

    let output = f.store.get_blobs("e").unwrap().unwrap();
    assert_eq!(output.len(), 2);
    assert_eq!(&output[1].data[..], b"two");
}

#[test]
fn test_stores_are_isolated_by_name() {
    let f = default_fixture();
    let other = TransientStore::new(
        TransientStoreConfig::named("other"),
        f.kv.clone(),
        Arc::new(MemoryBlobProvider::new("transient_other")),
    )
    .unwrap();
    f.store.put_parameter("e", "p", "mine").unwrap();
    assert!(!other.exists("e").unwrap());

    other.remove_all().unwrap();
    assert!(f.store.exists("e").unwrap());
}
