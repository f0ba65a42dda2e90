use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use ptr_hash_table::{Arena, Identity, PtrTable};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

// Pointer-like identity: 16-byte aligned inside a 1 GiB heap window.
fn ident(n: u64) -> Identity {
    Identity::new(0x7f00_0000_0000 + ((n as usize) & 0x3fff_fff0))
}

fn bench_insert_fresh_100k(c: &mut Criterion) {
    c.bench_function("ptr_table::insert_fresh_100k", |b| {
        b.iter_batched(
            || PtrTable::<u64>::new(Arena::new().shared(), 64).unwrap(),
            |mut t| {
                for (i, x) in lcg(1).take(100_000).enumerate() {
                    *t.get_or_insert_with(ident(x), || 0) += i as u64;
                }
                black_box(t)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_lookup_hit_100k(c: &mut Criterion) {
    let mut t = PtrTable::<u64>::new(Arena::new().shared(), 64).unwrap();
    let keys: Vec<Identity> = lcg(7).take(100_000).map(ident).collect();
    for k in &keys {
        t.find_or_create(*k);
    }
    c.bench_function("ptr_table::find_or_create_hit_100k", |b| {
        b.iter(|| {
            for k in &keys {
                black_box(t.find_or_create(*k));
            }
        })
    });
}

fn bench_sample_hot_set(c: &mut Criterion) {
    // Profiler-like workload: a small hot set hit over and over.
    let keys: Vec<Identity> = lcg(11).take(512).map(ident).collect();
    c.bench_function("ptr_table::sample_hot_512_x_200", |b| {
        b.iter_batched(
            || PtrTable::<u64>::new(Arena::new().shared(), 16).unwrap(),
            |mut t| {
                for _ in 0..200 {
                    for k in &keys {
                        *t.get_or_insert_with(*k, || 0) += 1;
                    }
                }
                black_box(t)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_iter_100k(c: &mut Criterion) {
    let mut t = PtrTable::<u64>::new(Arena::new().shared(), 64).unwrap();
    for (i, x) in lcg(13).take(100_000).enumerate() {
        t.get_or_insert_with(ident(x), || i as u64);
    }
    c.bench_function("ptr_table::iter_100k", |b| {
        b.iter(|| black_box(t.iter().count()))
    });
}

fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(3))
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_insert_fresh_100k, bench_lookup_hit_100k, bench_sample_hot_set, bench_iter_100k
}
criterion_main!(benches);
