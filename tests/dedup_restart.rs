// tests/dedup_restart.rs
//! Durability of the processed-id store across process restarts.

use market_sentry::dedup::DedupStore;
use market_sentry::poll::types::Category;

#[test]
fn seen_ids_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("processed_ids.json");

    let mut store = DedupStore::load(&path, 1000).unwrap();
    store.mark_seen(Category::News, "n1");
    store.mark_seen(Category::Social, "s1");
    store.save().unwrap();

    let reloaded = DedupStore::load(&path, 1000).unwrap();
    assert!(reloaded.is_seen(Category::News, "n1"));
    assert!(reloaded.is_seen(Category::Social, "s1"));
    assert!(!reloaded.is_seen(Category::News, "s1"));
}

#[test]
fn missing_file_yields_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = DedupStore::load(dir.path().join("nonexistent.json"), 1000).unwrap();
    assert!(store.is_empty());
}

#[test]
fn corrupt_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("processed_ids.json");
    std::fs::write(&path, "not json at all").unwrap();
    assert!(DedupStore::load(&path, 1000).is_err());
}

#[test]
fn eviction_order_is_preserved_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("processed_ids.json");

    let mut store = DedupStore::load(&path, 1000).unwrap();
    for i in 0..5 {
        store.mark_seen(Category::Social, &format!("id-{i}"));
    }
    store.save().unwrap();

    // reload with a smaller cap: the oldest ids are the ones dropped
    let reloaded = DedupStore::load(&path, 3).unwrap();
    assert!(!reloaded.is_seen(Category::Social, "id-0"));
    assert!(!reloaded.is_seen(Category::Social, "id-1"));
    assert!(reloaded.is_seen(Category::Social, "id-2"));
    assert!(reloaded.is_seen(Category::Social, "id-4"));
    assert_eq!(reloaded.len(Category::Social), 3);
}

#[test]
fn legacy_document_with_missing_keys_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("processed_ids.json");
    std::fs::write(&path, r#"{"news": ["n1"]}"#).unwrap();

    let store = DedupStore::load(&path, 1000).unwrap();
    assert!(store.is_seen(Category::News, "n1"));
    assert_eq!(store.len(Category::Social), 0);
}
