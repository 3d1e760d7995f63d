use std::collections::BTreeMap;

use requery::spec::{EntityType, ParamValue, QuerySpec, Variant};
use requery::store::{PersistenceMode, QueryRecordStore};

fn setup() -> QueryRecordStore {
    QueryRecordStore::new(PersistenceMode::InMemory).expect("store")
}

#[test]
fn identical_specs_share_one_record() {
    let store = setup();
    let spec = QuerySpec::new(EntityType::Observation, Variant::ByUser { user: 7 }).expect("spec");
    let (first, reused_first) = store.find_or_create(&spec).expect("create");
    let (second, reused_second) = store.find_or_create(&spec).expect("reuse");
    assert!(!reused_first);
    assert!(reused_second);
    assert_eq!(first.id(), second.id());
    assert_eq!(store.len().expect("len"), 1);
}

#[test]
fn distinct_specs_get_distinct_records() {
    let store = setup();
    let by_user =
        QuerySpec::new(EntityType::Observation, Variant::ByUser { user: 7 }).expect("spec");
    let all = QuerySpec::new(EntityType::Observation, Variant::All).expect("spec");
    let (a, _) = store.find_or_create(&by_user).expect("create");
    let (b, _) = store.find_or_create(&all).expect("create");
    assert_ne!(a.id(), b.id());
    assert_eq!(store.len().expect("len"), 2);
}

#[test]
fn repeating_a_batch_reuses_all_the_old_queries() {
    let store = setup();
    let batch = [
        QuerySpec::new(EntityType::Observation, Variant::All).expect("spec"),
        QuerySpec::new(EntityType::Image, Variant::ByUser { user: 3 }).expect("spec"),
        QuerySpec::new(EntityType::Name, Variant::InSet { ids: vec![5, 9] }).expect("spec"),
    ];
    for spec in &batch {
        store.find_or_create(spec).expect("create");
    }
    let before = store.len().expect("len");
    for spec in &batch {
        let (_, reused) = store.find_or_create(spec).expect("reuse");
        assert!(reused, "second pass should reuse every record");
    }
    assert_eq!(store.len().expect("len"), before);

    // A different target needs a new query this time.
    let other = QuerySpec::new(EntityType::Image, Variant::ByUser { user: 4 }).expect("spec");
    store.find_or_create(&other).expect("create");
    assert_eq!(store.len().expect("len"), before + 1);
}

#[test]
fn canonicalization_folds_equivalent_inputs() {
    let store = setup();
    // Duplicate set members collapse.
    let a = QuerySpec::new(EntityType::Name, Variant::InSet { ids: vec![5, 5, 3] }).expect("spec");
    let b = QuerySpec::new(EntityType::Name, Variant::InSet { ids: vec![5, 3] }).expect("spec");
    assert_eq!(a.signature(), b.signature());
    let (ra, _) = store.find_or_create(&a).expect("create");
    let (rb, reused) = store.find_or_create(&b).expect("reuse");
    assert!(reused);
    assert_eq!(ra.id(), rb.id());

    // Loosely-typed input normalizes to the same record: a digit string,
    // a bare int and a one-element list all mean the same user id.
    let mut digits = BTreeMap::new();
    digits.insert("user".to_string(), ParamValue::Str("7".to_string()));
    let mut listed = BTreeMap::new();
    listed.insert(
        "user".to_string(),
        ParamValue::List(vec![ParamValue::Int(7)]),
    );
    let typed = QuerySpec::new(EntityType::Image, Variant::ByUser { user: 7 }).expect("spec");
    let from_digits = QuerySpec::from_parts("image", "by_user", &digits).expect("from digits");
    let from_list = QuerySpec::from_parts("image", "by_user", &listed).expect("from list");
    assert_eq!(typed.signature(), from_digits.signature());
    assert_eq!(typed.signature(), from_list.signature());
}

#[test]
fn set_order_is_part_of_the_query_identity() {
    // The given order is the result order, so a reordered set is a
    // different query.
    let a = QuerySpec::new(EntityType::Name, Variant::InSet { ids: vec![3, 5] }).expect("spec");
    let b = QuerySpec::new(EntityType::Name, Variant::InSet { ids: vec![5, 3] }).expect("spec");
    assert_ne!(a.signature(), b.signature());
}

#[test]
fn reuse_bumps_the_access_count() {
    let store = setup();
    let spec = QuerySpec::new(EntityType::Comment, Variant::All).expect("spec");
    let (record, _) = store.find_or_create(&spec).expect("create");
    assert_eq!(store.access_count(record.id()).expect("count"), 0);
    store.find_or_create(&spec).expect("reuse");
    store.load(record.id()).expect("load");
    assert_eq!(store.access_count(record.id()).expect("count"), 2);
}

#[test]
fn racing_creators_persist_exactly_one_record() {
    let store = setup();
    let spec = QuerySpec::new(EntityType::Observation, Variant::ByUser { user: 11 }).expect("spec");
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..50 {
                    store.find_or_create(&spec).expect("find or create");
                }
            });
        }
    });
    assert_eq!(store.len().expect("len"), 1);
}

#[test]
fn load_of_a_missing_record_is_not_found() {
    let store = setup();
    let err = store.load(9999).expect_err("should be missing");
    assert!(
        matches!(err, requery::error::RequeryError::NotFound(_)),
        "wrong error: {err}"
    );
}
