use chrono::Duration;
use requery::error::RequeryError;
use requery::spec::{EntityType, QuerySpec, Variant};
use requery::store::{PersistenceMode, QueryRecordStore};

#[test]
fn in_memory_mode_allows_basic_operations() {
    let store = QueryRecordStore::new(PersistenceMode::InMemory).expect("store");
    assert!(store.is_empty().expect("empty"));
    let spec = QuerySpec::new(EntityType::Observation, Variant::All).expect("spec");
    let (record, existed) = store.find_or_create(&spec).expect("create");
    assert!(!existed);
    assert_eq!(store.len().expect("len"), 1);
    let loaded = store.load(record.id()).expect("load");
    assert_eq!(loaded.spec(), &spec);
    assert_eq!(loaded.signature(), record.signature());
}

#[test]
fn file_mode_deduplicates_across_restarts() {
    // Use a temp path; reopen the same file to prove records survive.
    let path = "test_requery_restart.db".to_string();
    let _ = std::fs::remove_file(&path);

    let spec = QuerySpec::new(
        EntityType::Image,
        Variant::InsideObservation {
            observation: 5,
            outer: 1,
        },
    )
    .expect("spec");
    let id = {
        let store = QueryRecordStore::new(PersistenceMode::File(path.clone())).expect("store");
        let (record, existed) = store.find_or_create(&spec).expect("create");
        assert!(!existed);
        record.id()
    };

    let store = QueryRecordStore::new(PersistenceMode::File(path.clone())).expect("reopen");
    assert_eq!(store.len().expect("len"), 1);
    let loaded = store.load(id).expect("load after reopen");
    assert_eq!(loaded.spec(), &spec, "spec decodes from the stored row");
    let (record, existed) = store.find_or_create(&spec).expect("find");
    assert!(existed, "the restart must not mint a second record");
    assert_eq!(record.id(), id);

    // Clean up
    drop(store);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn cleanup_sweeps_stale_records() {
    let store = QueryRecordStore::new(PersistenceMode::InMemory).expect("store");
    let spec = QuerySpec::new(EntityType::Name, Variant::All).expect("spec");
    let (record, _) = store.find_or_create(&spec).expect("create");

    // Generous ages sweep nothing.
    let swept = store
        .cleanup(Duration::hours(1), Duration::days(1))
        .expect("cleanup");
    assert_eq!(swept, 0);
    assert_eq!(store.len().expect("len"), 1);

    // Zero ages make everything stale, including the keeper cache entry.
    let swept = store
        .cleanup(Duration::zero(), Duration::zero())
        .expect("cleanup");
    assert_eq!(swept, 1);
    assert!(store.is_empty().expect("empty"));
    let err = store.load(record.id()).expect_err("swept record");
    assert!(matches!(err, RequeryError::NotFound(_)), "wrong error: {err}");

    // The next identical search simply creates a fresh record.
    let (fresh, existed) = store.find_or_create(&spec).expect("recreate");
    assert!(!existed);
    assert_ne!(fresh.id(), record.id(), "identities are never reused");
}
