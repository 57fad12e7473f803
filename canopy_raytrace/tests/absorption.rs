// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end absorption runs: single tree, partitioned, and the per-crossing route.

use canopy_index::{Bvh, Ray};
use canopy_query::{Callback, Csr, QueryError, TraversalPolicy, query};
use canopy_raytrace::{
    AggregatedRecord, Blackbody, CellGrid, IntersectedCell, Medium, OrderedAccumulation,
    RayCellIntersections, RaytraceError, Rays, absorbed_energy, absorbed_energy_distributed,
    aggregate_intersections, forward_deposit,
};
use kurbo::{Point, Vec2};
use proptest::prelude::*;

fn close(a: &[f64], b: &[f64], rel: f64) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= rel * x.abs().max(y.abs()).max(1.0))
}

#[test]
fn two_cells_in_closed_form() {
    // One column of two unit cells; the lower one emits three times as much.
    let grid = CellGrid::new(1, 2, 1.0, 2.0).unwrap();
    let weights = vec![3.0, 1.0];
    let medium = Medium::new(1.0);
    let rays = [
        Ray::new(Point::new(0.5, 0.5), Vec2::new(0.0, 1.0)),
        Ray::new(Point::new(0.5, 1.5), Vec2::new(1.0, 0.0)),
    ];
    let e = |x: f64| (-x).exp();
    let first = 3.0 * (1.0 - e(0.5)) + (e(0.5) - e(1.5));
    let second = 1.0 - e(0.5);
    let factor = 4.0 * std::f64::consts::PI;
    let expected = [factor * first, factor * second];

    let policy = TraversalPolicy::default();
    let single = absorbed_energy(&grid, &rays, 1, &medium, &weights, &policy).unwrap();
    assert!(close(&single, &expected, 1e-12), "{single:?} vs {expected:?}");

    let split =
        absorbed_energy_distributed(&grid, &rays, 1, 2, &medium, weights.clone(), &policy).unwrap();
    assert!(close(&split, &expected, 1e-12), "{split:?} vs {expected:?}");
}

#[test]
fn rays_leaving_the_grid_deposit_nothing_further() {
    let grid = CellGrid::new(2, 1, 2.0, 1.0).unwrap();
    let rays = [
        // Starts in cell 0 and heads straight out of the domain.
        Ray::new(Point::new(0.5, 0.5), Vec2::new(-1.0, 0.0)),
        Ray::new(Point::new(1.5, 0.5), Vec2::new(0.0, -1.0)),
    ];
    let energy = absorbed_energy(
        &grid,
        &rays,
        1,
        &Medium::new(1.0),
        &1.0_f64,
        &TraversalPolicy::default(),
    )
    .unwrap();
    let expected = 4.0 * std::f64::consts::PI * (1.0 - (-0.5_f64).exp());
    assert!(close(&energy, &[expected, expected], 1e-12), "{energy:?}");
}

#[test]
fn buffer_policies_and_reordering_agree_exactly() {
    let grid = CellGrid::new(5, 4, 5.0, 4.0).unwrap();
    let rays = grid.sample_rays(6, 11);
    let medium = Medium::new(0.7);
    let run = |policy: TraversalPolicy| {
        absorbed_energy(&grid, &rays, 6, &medium, &Blackbody::default(), &policy).unwrap()
    };
    let reference = run(TraversalPolicy::default());
    for size in [1, 3, 40, -64] {
        for sort in [true, false] {
            let policy = TraversalPolicy::default()
                .with_buffer_size(size)
                .with_predicate_sorting(sort);
            assert_eq!(run(policy), reference, "buffer {size}, sort {sort}");
        }
    }
}

#[test]
fn too_small_failing_buffer_is_reported() {
    let grid = CellGrid::new(4, 4, 4.0, 4.0).unwrap();
    let rays = grid.sample_rays(2, 3);
    let medium = Medium::default();
    let policy = TraversalPolicy::default().with_buffer_size(-1);
    let err = absorbed_energy(&grid, &rays, 2, &medium, &1.0_f64, &policy).unwrap_err();
    match err {
        RaytraceError::Query(QueryError::BufferOverflow { overflows }) => {
            assert!(!overflows.is_empty());
            assert!(overflows.iter().all(|o| o.reserved == 1 && o.found > 1));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Every rank returns instead of waiting on the others.
    assert!(absorbed_energy_distributed(&grid, &rays, 2, 2, &medium, 1.0_f64, &policy).is_err());
}

#[test]
fn bad_partitioning_is_rejected() {
    let grid = CellGrid::new(3, 2, 3.0, 2.0).unwrap();
    let rays = grid.sample_rays(1, 0);
    let medium = Medium::default();
    let policy = TraversalPolicy::default();
    assert!(matches!(
        absorbed_energy_distributed(&grid, &rays, 1, 3, &medium, 1.0_f64, &policy),
        Err(RaytraceError::InvalidPartitioning { rows: 2, ranks: 3 })
    ));
    assert!(matches!(
        absorbed_energy_distributed(&grid, &rays, 1, 0, &medium, 1.0_f64, &policy),
        Err(RaytraceError::InvalidPartitioning { .. })
    ));
    assert!(matches!(
        absorbed_energy_distributed(&grid, &rays[1..], 1, 1, &medium, 1.0_f64, &policy),
        Err(RaytraceError::InvalidGrid(_))
    ));
}

#[test]
fn inline_and_post_process_routes_agree() {
    let grid = CellGrid::new(6, 5, 3.0, 2.5).unwrap();
    let boxes = grid.boxes();
    let bvh = Bvh::new(&boxes);
    let rays = grid.sample_rays(3, 5);
    let medium = Medium::new(1.3);
    let weights: Vec<f64> = (0..grid.cell_count()).map(|i| 1.0 + (i % 7) as f64).collect();
    let policy = TraversalPolicy::default();

    let crossings: Csr<IntersectedCell> = query(
        &bvh,
        &Rays::new(&rays),
        &Callback::inline(RayCellIntersections::new(&boxes, medium)),
        &policy,
    )
    .unwrap();
    let route_one = aggregate_intersections(crossings.values().to_vec(), rays.len(), &weights);

    let records: Csr<AggregatedRecord> = query(
        &bvh,
        &Rays::new(&rays),
        &Callback::post_process(OrderedAccumulation::new(&boxes, medium, &weights)),
        &policy,
    )
    .unwrap();
    assert_eq!(records.values(), route_one.as_slice());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn partitioned_runs_match_one_tree(
        nx in 1..7_usize,
        ny in 1..7_usize,
        ranks in 1..7_usize,
        kappa in 0.05..4.0_f64,
        seed in any::<u64>(),
    ) {
        let ranks = ranks.min(ny);
        let grid = CellGrid::new(nx, ny, 2.0, 3.0).unwrap();
        let rays = grid.sample_rays(4, seed);
        let medium = Medium::new(kappa);
        let weights: Vec<f64> = (0..grid.cell_count()).map(|i| 0.5 + (i % 3) as f64).collect();
        let policy = TraversalPolicy::default();

        let single = absorbed_energy(&grid, &rays, 4, &medium, &weights, &policy).unwrap();
        let split =
            absorbed_energy_distributed(&grid, &rays, 4, ranks, &medium, weights.clone(), &policy)
                .unwrap();
        prop_assert!(close(&single, &split, 1e-9), "{single:?} vs {split:?}");
    }

    #[test]
    fn energy_is_linear_in_emission(
        a in prop::collection::vec(0.0..5.0_f64, 12),
        b in prop::collection::vec(0.0..5.0_f64, 12),
        seed in any::<u64>(),
    ) {
        let grid = CellGrid::new(4, 3, 4.0, 3.0).unwrap();
        let rays = grid.sample_rays(3, seed);
        let medium = Medium::new(0.8);
        let policy = TraversalPolicy::default();
        let sum: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x + y).collect();

        let ea = absorbed_energy(&grid, &rays, 3, &medium, &a, &policy).unwrap();
        let eb = absorbed_energy(&grid, &rays, 3, &medium, &b, &policy).unwrap();
        let esum = absorbed_energy(&grid, &rays, 3, &medium, &sum, &policy).unwrap();
        let added: Vec<f64> = ea.iter().zip(&eb).map(|(x, y)| x + y).collect();
        prop_assert!(close(&esum, &added, 1e-9), "{esum:?} vs {added:?}");
    }

    #[test]
    fn forward_deposit_conserves_energy(seed in any::<u64>(), kappa in 0.01..5.0_f64) {
        let grid = CellGrid::new(5, 5, 1.0, 1.0).unwrap();
        let boxes = grid.boxes();
        let bvh = Bvh::new(&boxes);
        let rays = grid.sample_rays(2, seed);
        let crossings: Csr<IntersectedCell> = query(
            &bvh,
            &Rays::new(&rays),
            &Callback::inline(RayCellIntersections::new(&boxes, Medium::new(kappa))),
            &TraversalPolicy::default(),
        )
        .unwrap();
        let mut records = crossings.values().to_vec();
        let out = forward_deposit(&mut records, rays.len(), 2.5, grid.cell_count());
        let total = out.absorbed.iter().sum::<f64>() + out.escaped;
        let emitted = 2.5 * 50.0;
        prop_assert!((total - emitted).abs() <= 1e-9 * emitted);
        prop_assert!(out.absorbed.iter().all(|&e| e >= 0.0));
    }
}
