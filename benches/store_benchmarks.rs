//! Array store benchmarks for packstore
//!
//! Run with: cargo bench --bench store_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use packstore::data::EntryRef;
use packstore::store::{ArrayStore, ArrayStoreConfig};

/// Generate a random array of the given length
fn random_array(len: usize) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

fn bench_store() -> ArrayStore<u32> {
    ArrayStore::new(ArrayStoreConfig::new(8)).unwrap()
}

// ============================================================================
// Add Benchmarks
// ============================================================================

fn bench_add_small(c: &mut Criterion) {
    let mut group = c.benchmark_group("ArrayStore_Add_Small");

    for len in [1usize, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("len", len), len, |b, &len| {
            let mut store = bench_store();
            let values = random_array(len);
            b.iter(|| store.add(black_box(&values)).unwrap())
        });
    }

    group.finish();
}

fn bench_add_large(c: &mut Criterion) {
    let mut group = c.benchmark_group("ArrayStore_Add_Large");

    for len in [16usize, 64, 256, 1024].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("len", len), len, |b, &len| {
            let mut store = bench_store();
            let values = random_array(len);
            b.iter(|| store.add(black_box(&values)).unwrap())
        });
    }

    group.finish();
}

// ============================================================================
// Get Benchmarks
// ============================================================================

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("ArrayStore_Get");

    for len in [2usize, 8, 256].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("len", len), len, |b, &len| {
            let mut store = bench_store();
            let refs: Vec<EntryRef> = (0..10_000)
                .map(|_| store.add(&random_array(len)).unwrap())
                .collect();
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % refs.len();
                black_box(store.get(refs[i]).len())
            })
        });
    }

    group.finish();
}

// ============================================================================
// Maintenance Benchmarks
// ============================================================================

fn bench_remove_and_trim(c: &mut Criterion) {
    let mut group = c.benchmark_group("ArrayStore_Maintenance");

    group.bench_function("remove_trim_10k", |b| {
        b.iter_batched(
            || {
                let mut store = bench_store();
                let refs: Vec<EntryRef> = (0..10_000)
                    .map(|_| store.add(&random_array(4)).unwrap())
                    .collect();
                (store, refs)
            },
            |(mut store, refs)| {
                for r in &refs {
                    store.remove(*r);
                }
                store.transfer_hold_lists(1);
                store.trim_hold_lists(1);
                black_box(store.memory_usage().allocated_bytes)
            },
            criterion::BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("ArrayStore_Compaction");
    group.sample_size(20);

    group.bench_function("compact_90pct_dead", |b| {
        b.iter_batched(
            || {
                let mut store = bench_store();
                let mut refs: Vec<EntryRef> = (0..10_000)
                    .map(|_| store.add(&random_array(4)).unwrap())
                    .collect();
                for (i, r) in refs.iter_mut().enumerate() {
                    if i % 10 != 0 {
                        store.remove(*r);
                        *r = EntryRef::INVALID;
                    }
                }
                (store, refs)
            },
            |(mut store, mut refs)| {
                if let Some(mut ctx) = store.compact_worst().unwrap() {
                    ctx.compact(&mut refs).unwrap();
                }
                black_box(refs.len())
            },
            criterion::BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_add_small,
    bench_add_large,
    bench_get,
    bench_remove_and_trim,
    bench_compaction,
);
criterion_main!(benches);
