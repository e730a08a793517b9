mod common;

use common::FakeBackend;
use std::{sync::Arc, thread, time::Duration};
use stem_splitter_ui::{ModelCache, StemError};

#[test]
fn same_name_returns_same_instance() {
    let backend = Arc::new(FakeBackend::default());
    let cache = ModelCache::new(backend.clone());

    let a = cache.get("htdemucs").unwrap();
    let b = cache.get("htdemucs").unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(backend.loads(), 1);
}

#[test]
fn different_names_are_distinct_and_both_kept() {
    let backend = Arc::new(FakeBackend::default());
    let cache = ModelCache::new(backend.clone());

    let four = cache.get("htdemucs").unwrap();
    let six = cache.get("htdemucs_6s").unwrap();
    assert!(!Arc::ptr_eq(&four, &six));
    assert_eq!(four.sources().len(), 4);
    assert_eq!(six.sources().len(), 6);

    // Neither was evicted by the other.
    assert!(Arc::ptr_eq(&four, &cache.get("htdemucs").unwrap()));
    assert!(Arc::ptr_eq(&six, &cache.get("htdemucs_6s").unwrap()));
    assert_eq!(backend.loads(), 2);
    assert_eq!(cache.cached(), ["htdemucs", "htdemucs_6s"]);
}

#[test]
fn concurrent_first_requests_construct_once() {
    let backend = Arc::new(FakeBackend::slow(Duration::from_millis(50)));
    let cache = Arc::new(ModelCache::new(backend.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get("htdemucs").unwrap())
        })
        .collect();
    let models: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(backend.loads(), 1);
    assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn failed_construction_is_not_cached() {
    let cache = ModelCache::new(Arc::new(FakeBackend::default()));

    let err = cache.get("mdx_extra").err().expect("unknown model should fail");
    assert!(matches!(err, StemError::Registry(_)));
    assert!(cache.cached().is_empty());
}
