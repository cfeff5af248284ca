use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::distributions::Alphanumeric;
use rand::prelude::*;
use ramdb::{Accumulate, Decimal, MemStore, RamEngine};

const TTL: Duration = Duration::from_secs(3600);
const ENTRIES: usize = 1000;

fn random_pairs(rng: &mut SmallRng) -> Vec<(String, String)> {
    (0..ENTRIES)
        .map(|_| {
            let key_len = rng.gen_range(1..=100);
            let value_len = rng.gen_range(1..=1000);
            let key: String = (&mut *rng).sample_iter(&Alphanumeric).take(key_len).map(char::from).collect();
            let value: String = (&mut *rng).sample_iter(&Alphanumeric).take(value_len).map(char::from).collect();
            (key, value)
        })
        .collect()
}

fn set_bench(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(1);
    let pairs = random_pairs(&mut rng);

    c.bench_function("memstore_set", |b| {
        b.iter_batched(
            || (MemStore::new(), pairs.clone()),
            |(store, pairs)| {
                for (key, value) in pairs {
                    store.set(key, value, TTL);
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn get_bench(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(2);
    let pairs = random_pairs(&mut rng);
    let store = MemStore::new();
    for (key, value) in &pairs {
        store.set(key.clone(), value.clone(), TTL);
    }

    c.bench_function("memstore_get", |b| {
        b.iter(|| {
            for (key, _) in &pairs {
                black_box(store.get(key));
            }
        })
    });
}

fn accumulate_bench(c: &mut Criterion) {
    let store = MemStore::new();
    let delta = Decimal::new(125, 2);

    c.bench_function("memstore_increment", |b| {
        b.iter(|| black_box(store.accumulate("counter", delta, Accumulate::Increment)))
    });
}

criterion_group!(benches, set_bench, get_bench, accumulate_bench);
criterion_main!(benches);
