// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use canopy_query::TraversalPolicy;
use canopy_raytrace::{Blackbody, CellGrid, Medium, absorbed_energy, absorbed_energy_distributed};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

fn bench_absorption(c: &mut Criterion) {
    let grid = CellGrid::new(64, 64, 100.0, 100.0).unwrap();
    let rays = grid.sample_rays(10, 0xC1A5_7E55_9999_ABCD);
    let medium = Medium::new(0.1);
    let mut group = c.benchmark_group("absorption_64x64");
    group.sample_size(10);
    group.throughput(Throughput::Elements(rays.len() as u64));
    for size in [0, 200, -200] {
        let policy = TraversalPolicy::default().with_buffer_size(size);
        group.bench_function(format!("single_buffer_{size}"), |b| {
            b.iter(|| {
                let e = absorbed_energy(&grid, &rays, 10, &medium, &Blackbody::default(), &policy)
                    .unwrap();
                black_box(e);
            });
        });
    }
    for ranks in [2, 4, 8] {
        let policy = TraversalPolicy::default();
        group.bench_function(format!("row_strips_{ranks}"), |b| {
            b.iter(|| {
                let e = absorbed_energy_distributed(
                    &grid,
                    &rays,
                    10,
                    ranks,
                    &medium,
                    Blackbody::default(),
                    &policy,
                )
                .unwrap();
                black_box(e);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_absorption);
criterion_main!(benches);
