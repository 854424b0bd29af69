use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fga_cache::{L1Cache, L2Cache};
use fga_proto::CacheKey;

fn key(seed: u64) -> CacheKey {
    CacheKey {
        low: seed,
        high: seed.wrapping_mul(31).wrapping_add(7),
    }
}

fn bench_l1(c: &mut Criterion) {
    let mut group = c.benchmark_group("l1");
    group.throughput(Throughput::Elements(1));

    group.bench_function("store_then_hit", |b| {
        let mut l1 = L1Cache::new();
        let k = key(1);
        l1.store(&k, 1, u64::MAX, true);
        b.iter(|| black_box(l1.lookup(&k, 1, 0)));
    });

    group.bench_function("store_distinct_keys", |b| {
        let mut l1 = L1Cache::new();
        let mut seed = 0u64;
        b.iter(|| {
            seed = seed.wrapping_add(1);
            l1.store(&key(seed), 1, u64::MAX, true);
        });
    });

    group.finish();
}

/// L2 lookup throughput under read-mostly contention (the expected access
/// pattern: many workers checking, few writes bumping generations).
fn bench_l2_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_lookup");

    for capacity in [1024usize, 8192, 65536].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), capacity, |b, &capacity| {
            let l2 = L2Cache::new(capacity);
            for i in 0..capacity as u64 {
                l2.store(&key(i), 1, 0, u64::MAX, true);
            }
            let probe = key(capacity as u64 / 2);
            b.iter(|| black_box(l2.lookup(&probe, 1, 0)));
        });
    }

    group.finish();
}

fn bench_l2_store_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_store_with_eviction");
    group.throughput(Throughput::Elements(1));

    group.bench_function("full_table_churn", |b| {
        let l2 = L2Cache::new(1024);
        for i in 0..1024u64 {
            l2.store(&key(i), 1, 0, u64::MAX, true);
        }
        let mut seed = 1024u64;
        b.iter(|| {
            seed = seed.wrapping_add(1);
            l2.store(&key(seed), 1, 0, u64::MAX, true);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_l1, bench_l2_lookup, bench_l2_store_with_eviction);
criterion_main!(benches);
