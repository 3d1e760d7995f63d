use std::collections::BTreeMap;

use chrono::NaiveDate;
use requery::error::RequeryError;
use requery::resolve::{EntityLoader, MemoryDataset, ResultResolver};
use requery::spec::{EntityId, EntityType, ParamValue, QuerySpec, Variant};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).expect("date")
}

struct Corpus {
    data: MemoryDataset,
    alice: EntityId,
    bob: EntityId,
    meadow_obs: EntityId,
    forest_obs: EntityId,
    late_obs: EntityId,
    meadow: EntityId,
}

fn setup() -> Corpus {
    let mut data = MemoryDataset::new();
    let alice = data.add_user("alice");
    let bob = data.add_user("bob");
    let meadow = data.add_location("Albion meadow", alice);
    let forest = data.add_location("Gualala forest", bob);
    let campestris = data.add_name("Agaricus campestris", alice);
    let comatus = data.add_name("Coprinus comatus", alice);

    let meadow_obs = data.add_observation(
        date(1),
        alice,
        Some(campestris),
        Some(meadow),
        "fairy ring by the fence",
    );
    let forest_obs = data.add_observation(
        date(5),
        bob,
        Some(comatus),
        Some(forest),
        "shaggy caps after rain",
    );
    let late_obs = data.add_observation(date(9), alice, Some(comatus), Some(meadow), "second find");

    let ring_img = data.add_image(alice, "ring overview");
    data.attach_image(meadow_obs, ring_img);
    let cap_img = data.add_image(bob, "cap closeup");
    data.attach_image(forest_obs, cap_img);
    data.add_comment(bob, meadow_obs, "lovely ring");

    Corpus {
        data,
        alice,
        bob,
        meadow_obs,
        forest_obs,
        late_obs,
        meadow,
    }
}

fn resolve(corpus: &Corpus, spec: &QuerySpec) -> Vec<EntityId> {
    corpus.data.resolve(spec).expect("resolve")
}

#[test]
fn resolution_is_deterministic() {
    let corpus = setup();
    let spec = QuerySpec::new(EntityType::Observation, Variant::All).expect("spec");
    assert_eq!(resolve(&corpus, &spec), resolve(&corpus, &spec));
}

#[test]
fn observations_list_newest_first() {
    let corpus = setup();
    let spec = QuerySpec::new(EntityType::Observation, Variant::All).expect("spec");
    assert_eq!(
        resolve(&corpus, &spec),
        vec![corpus.late_obs, corpus.forest_obs, corpus.meadow_obs]
    );
}

#[test]
fn names_list_alphabetically() {
    let corpus = setup();
    let spec = QuerySpec::new(EntityType::Name, Variant::All).expect("spec");
    let ids = resolve(&corpus, &spec);
    let texts: Vec<String> = ids
        .iter()
        .map(|&id| {
            corpus
                .data
                .load_entity(EntityType::Name, id)
                .expect("card")
                .label
        })
        .collect();
    let mut sorted = texts.clone();
    sorted.sort();
    assert_eq!(texts, sorted);
}

#[test]
fn by_user_and_at_location_filter() {
    let corpus = setup();
    let by_alice =
        QuerySpec::new(EntityType::Observation, Variant::ByUser { user: corpus.alice })
            .expect("spec");
    assert_eq!(
        resolve(&corpus, &by_alice),
        vec![corpus.late_obs, corpus.meadow_obs]
    );

    let by_bob =
        QuerySpec::new(EntityType::Observation, Variant::ByUser { user: corpus.bob }).expect("spec");
    assert_eq!(resolve(&corpus, &by_bob), vec![corpus.forest_obs]);

    let at_meadow = QuerySpec::new(
        EntityType::Observation,
        Variant::AtLocation {
            location: corpus.meadow,
        },
    )
    .expect("spec");
    assert_eq!(
        resolve(&corpus, &at_meadow),
        vec![corpus.late_obs, corpus.meadow_obs]
    );
}

#[test]
fn pattern_search_spans_name_location_and_notes() {
    let corpus = setup();
    let spec = QuerySpec::from_parts(
        "observation",
        "pattern_search",
        &pattern_params("fairy OR shaggy"),
    )
    .expect("spec");
    assert_eq!(
        resolve(&corpus, &spec),
        vec![corpus.forest_obs, corpus.meadow_obs]
    );

    let spec = QuerySpec::from_parts(
        "observation",
        "pattern_search",
        &pattern_params("comatus -rain"),
    )
    .expect("spec");
    assert_eq!(resolve(&corpus, &spec), vec![corpus.late_obs]);
}

#[test]
fn advanced_search_intersects_dimensions() {
    let corpus = setup();
    let spec = QuerySpec::new(
        EntityType::Observation,
        Variant::AdvancedSearch {
            name: Some("comatus".to_string()),
            location: Some("meadow".to_string()),
            user: None,
            content: None,
        },
    )
    .expect("spec");
    assert_eq!(resolve(&corpus, &spec), vec![corpus.late_obs]);

    // The content dimension also looks through comments.
    let spec = QuerySpec::new(
        EntityType::Observation,
        Variant::AdvancedSearch {
            name: None,
            location: None,
            user: Some("alice".to_string()),
            content: Some("lovely".to_string()),
        },
    )
    .expect("spec");
    assert_eq!(resolve(&corpus, &spec), vec![corpus.meadow_obs]);

    // Images narrow through their observations.
    let spec = QuerySpec::new(
        EntityType::Image,
        Variant::AdvancedSearch {
            name: Some("campestris".to_string()),
            location: None,
            user: None,
            content: None,
        },
    )
    .expect("spec");
    assert_eq!(resolve(&corpus, &spec).len(), 1);
}

#[test]
fn in_set_preserves_the_given_order() {
    let corpus = setup();
    let spec = QuerySpec::new(
        EntityType::Observation,
        Variant::InSet {
            ids: vec![corpus.meadow_obs, corpus.late_obs, corpus.forest_obs],
        },
    )
    .expect("spec");
    assert_eq!(
        resolve(&corpus, &spec),
        vec![corpus.meadow_obs, corpus.late_obs, corpus.forest_obs]
    );

    // Missing entities drop out; the order of the rest stands.
    let spec = QuerySpec::new(
        EntityType::Observation,
        Variant::InSet {
            ids: vec![9999, corpus.forest_obs, corpus.meadow_obs],
        },
    )
    .expect("spec");
    assert_eq!(
        resolve(&corpus, &spec),
        vec![corpus.forest_obs, corpus.meadow_obs]
    );
}

#[test]
fn unregistered_combinations_are_rejected() {
    let err = QuerySpec::new(EntityType::User, Variant::ByUser { user: 1 })
        .expect_err("users have no creator search");
    assert!(
        matches!(err, RequeryError::UnsupportedVariant { .. }),
        "wrong error: {err}"
    );

    let err = QuerySpec::new(
        EntityType::Observation,
        Variant::InsideObservation {
            observation: 1,
            outer: 1,
        },
    )
    .expect_err("only images nest inside observations");
    assert!(matches!(err, RequeryError::UnsupportedVariant { .. }));
}

#[test]
fn loose_parts_are_validated() {
    // Unknown names anywhere are parse errors.
    let empty = BTreeMap::new();
    assert!(QuerySpec::from_parts("mushroom", "all", &empty).is_err());
    assert!(QuerySpec::from_parts("image", "newest", &empty).is_err());

    // Missing and unexpected parameters are named in the error.
    let err = QuerySpec::from_parts("image", "by_user", &empty).expect_err("missing user");
    assert!(err.to_string().contains("user"), "unhelpful error: {err}");
    let mut extra = BTreeMap::new();
    extra.insert("user".to_string(), ParamValue::Int(1));
    extra.insert("color".to_string(), ParamValue::Str("blue".to_string()));
    let err = QuerySpec::from_parts("image", "by_user", &extra).expect_err("extra param");
    assert!(err.to_string().contains("color"), "unhelpful error: {err}");

    // Ids must be positive integers in some spelling.
    let mut zero = BTreeMap::new();
    zero.insert("user".to_string(), ParamValue::Int(0));
    assert!(QuerySpec::from_parts("image", "by_user", &zero).is_err());
}

fn pattern_params(pattern: &str) -> BTreeMap<String, ParamValue> {
    let mut map = BTreeMap::new();
    map.insert(
        "pattern".to_string(),
        ParamValue::Str(pattern.to_string()),
    );
    map
}
