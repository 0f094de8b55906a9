// Pool arena benchmarks
//
// Sequential allocations, mixed workloads, sub-pool growth and fragment reuse.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use morph_mem::PoolArena;

/// Same-size allocations against a warm pool.
fn bench_sequential_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_alloc");

    for size in [4usize, 16, 64, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut arena = PoolArena::new(1 << 16);
            b.iter(|| {
                if arena.allocate(black_box(size), 8).is_err() {
                    arena.reset();
                }
            });
        });
    }

    group.finish();
}

/// Sizes and alignments cycling the way type and IR nodes do.
fn bench_mixed_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_alloc");

    group.bench_function("variable_sizes", |b| {
        let shapes = [(4, 4), (16, 8), (24, 8), (64, 16), (3, 1)];
        b.iter(|| {
            let mut arena = PoolArena::new(4096);
            for i in 0..1_000 {
                let (size, align) = shapes[i % shapes.len()];
                black_box(arena.allocate(size, align).unwrap());
            }
        });
    });

    group.finish();
}

/// Allocation that forces repeated sub-pool creation.
fn bench_pool_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_growth");
    group.sample_size(50);

    group.bench_function("from_64_bytes", |b| {
        b.iter(|| {
            let mut arena = PoolArena::new(64);
            for _ in 0..512 {
                black_box(arena.allocate(48, 8).unwrap());
            }
            black_box(arena.stats().pool_count)
        });
    });

    group.finish();
}

/// Small allocations served from retired fragments after a large request.
fn bench_fragment_reuse(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment_reuse");

    group.bench_function("small_after_large", |b| {
        b.iter(|| {
            let mut arena = PoolArena::new(256);
            arena.allocate(200, 8).unwrap();
            arena.allocate(1024, 8).unwrap();
            for _ in 0..64 {
                black_box(arena.allocate(8, 8).unwrap());
            }
        });
    });

    group.finish();
}

fn bench_alloc_str(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_str");

    for len in [8usize, 64, 512] {
        let text = "x".repeat(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &text, |b, text| {
            let mut arena = PoolArena::new(1 << 16);
            b.iter(|| {
                if arena.alloc_str(black_box(text)).is_err() {
                    arena.reset();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sequential_allocations,
    bench_mixed_allocations,
    bench_pool_growth,
    bench_fragment_reuse,
    bench_alloc_str
);
criterion_main!(benches);
