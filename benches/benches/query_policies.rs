// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use canopy_index::{Aabb, Bvh, FlatVec, NearestAlgorithm};
use canopy_query::{Predicate, TraversalPolicy, query_indices, query_nearest_with_distances};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::{Circle, Point};

fn gen_grid_cells(n: usize, cell: f64) -> Vec<Aabb> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            out.push(Aabb::from_xywh(x as f64 * cell, y as f64 * cell, cell, cell));
        }
    }
    out
}

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

fn gen_circles(count: usize, extent: f64, radius: f64) -> Vec<Predicate> {
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    (0..count)
        .map(|_| {
            let c = Point::new(rng.next_f64() * extent, rng.next_f64() * extent);
            Predicate::intersects(Circle::new(c, radius), ())
        })
        .collect()
}

fn gen_nearest(count: usize, extent: f64, k: i32) -> Vec<Predicate> {
    let mut rng = Rng::new(0xBADC_F00D_1234_5678);
    (0..count)
        .map(|_| Predicate::nearest((rng.next_f64() * extent, rng.next_f64() * extent), k, ()))
        .collect()
}

fn bench_buffer_policies(c: &mut Criterion) {
    let cells = gen_grid_cells(128, 1.0);
    let bvh = Bvh::new(&cells);
    let predicates = gen_circles(20_000, 128.0, 2.5);
    let mut group = c.benchmark_group("spatial_buffer");
    group.throughput(Throughput::Elements(predicates.len() as u64));
    // Circles touch around 25 cells. Sizes: exact, roomy, tight (recounts), roomy failing.
    for size in [0, 64, 8, -64] {
        let policy = TraversalPolicy::default().with_buffer_size(size);
        group.bench_function(format!("buffer_{size}"), |b| {
            b.iter(|| {
                let hits = query_indices(&bvh, &predicates, &policy).unwrap();
                black_box(hits.total());
            });
        });
    }
    group.finish();
}

fn bench_predicate_sorting(c: &mut Criterion) {
    let cells = gen_grid_cells(256, 1.0);
    let bvh = Bvh::new(&cells);
    let predicates = gen_circles(50_000, 256.0, 1.5);
    let mut group = c.benchmark_group("spatial_sorting");
    group.throughput(Throughput::Elements(predicates.len() as u64));
    for sort in [true, false] {
        let policy = TraversalPolicy::default().with_predicate_sorting(sort);
        group.bench_function(if sort { "z_order" } else { "caller_order" }, |b| {
            b.iter(|| {
                let hits = query_indices(&bvh, &predicates, &policy).unwrap();
                black_box(hits.total());
            });
        });
    }
    group.finish();
}

fn bench_nearest(c: &mut Criterion) {
    let cells = gen_grid_cells(128, 1.0);
    let bvh = Bvh::new(&cells);
    let flat = FlatVec::new(&cells);
    let predicates = gen_nearest(5_000, 128.0, 8);
    let mut group = c.benchmark_group("nearest_k8");
    group.throughput(Throughput::Elements(predicates.len() as u64));
    for (name, algorithm) in [
        ("stack", NearestAlgorithm::StackBased),
        ("heap", NearestAlgorithm::PriorityQueue),
    ] {
        let policy = TraversalPolicy::default().with_nearest_algorithm(algorithm);
        group.bench_function(format!("bvh_{name}"), |b| {
            b.iter(|| {
                let found = query_nearest_with_distances(&bvh, &predicates, &policy).unwrap();
                black_box(found.indices.len());
            });
        });
    }
    let small = &predicates[..500];
    group.bench_function("flatvec_500", |b| {
        b.iter(|| {
            let found =
                query_nearest_with_distances(&flat, &small, &TraversalPolicy::default()).unwrap();
            black_box(found.indices.len());
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_buffer_policies,
    bench_predicate_sorting,
    bench_nearest
);
criterion_main!(benches);
