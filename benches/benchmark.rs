use criterion::{Criterion, black_box, criterion_group, criterion_main};

use requery::codec;
use requery::spec::{EntityType, QuerySpec, Variant};
use requery::store::{PersistenceMode, QueryRecordStore};

pub fn criterion_benchmark(c: &mut Criterion) {
    let small = QuerySpec::new(EntityType::Observation, Variant::ByUser { user: 42 })
        .expect("spec");
    c.bench_function("signature by_user", |b| {
        b.iter(|| black_box(&small).signature())
    });

    let ids: Vec<u64> = (1..=1_000).collect();
    let large = QuerySpec::new(EntityType::Name, Variant::InSet { ids }).expect("spec");
    c.bench_function("signature in_set 1k", |b| {
        b.iter(|| black_box(&large).signature())
    });

    c.bench_function("codec round trip", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(123_456_789));
            codec::decode(&encoded)
        })
    });

    let store = QueryRecordStore::new(PersistenceMode::InMemory).expect("store");
    store.find_or_create(&small).expect("seed");
    c.bench_function("find_or_create hit", |b| {
        b.iter(|| store.find_or_create(black_box(&small)))
    });
    c.bench_function("find_or_create hit in_set 1k", |b| {
        b.iter(|| store.find_or_create(black_box(&large)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
