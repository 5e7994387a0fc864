use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use cond_core::{FloatTable, StringConditionId, StringTable, StringTableConfig, TableConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn bench_fixed(c: &mut Criterion) {
    let cfg = TableConfig::default().with_reserve_bytes(16 * 1024 * 1024).with_initial_pages(0);
    c.bench_function("float_add_100k", |b| {
        b.iter_batched(
            || FloatTable::init(&cfg).unwrap(),
            |mut t| {
                for i in 0..100_000 {
                    t.add_condition(i as f32).unwrap();
                }
                t
            },
            BatchSize::LargeInput,
        )
    });

    let mut t = FloatTable::init(&cfg).unwrap();
    let ids: Vec<_> = (0..100_000).map(|i| t.add_condition(i as f32).unwrap()).collect();
    c.bench_function("float_query", |b| {
        b.iter(|| ids.iter().map(|id| black_box(t.query_condition(*id).unwrap())).sum::<f32>())
    });
}

fn bench_strings(c: &mut Criterion) {
    let cfg = StringTableConfig::default().with_lookaside_bytes(12 * 10_000);
    let mut rng = StdRng::seed_from_u64(7);
    let edits: Vec<(u32, usize)> = (0..1_000)
        .map(|_| (rng.random_range(0..10_000), rng.random_range(0..24)))
        .collect();

    let fresh = || {
        let mut t = StringTable::init(&cfg).unwrap();
        for i in 0..10_000 {
            t.add_condition(format!("cond-{i}")).unwrap();
        }
        t
    };

    c.bench_function("string_shrink_in_place", |b| {
        b.iter_batched(
            fresh,
            |mut t| {
                for &(id, _) in &edits {
                    t.set_condition_value(StringConditionId::from_index(id), "c").unwrap();
                }
                t
            },
            BatchSize::LargeInput,
        )
    });

    c.bench_function("string_grow_and_shift", |b| {
        b.iter_batched(
            fresh,
            |mut t| {
                for &(id, extra) in &edits {
                    let v = "g".repeat(12 + extra);
                    t.set_condition_value(StringConditionId::from_index(id), v).unwrap();
                }
                t
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_fixed, bench_strings);
criterion_main!(benches);
