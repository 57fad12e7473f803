// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Nearest basics.
//!
//! Find the `k` nearest cells to a few points with both search algorithms and split
//! the results into indices and distances.
//!
//! Run:
//! - `cargo run -p canopy_demos --example nearest_basics`

use canopy_index::{Aabb, Bvh, NearestAlgorithm};
use canopy_query::{Predicate, TraversalPolicy, query_nearest_with_distances};

fn main() {
    env_logger::init();

    let cells: Vec<Aabb> = (0..10_u8)
        .map(|i| Aabb::from_xywh(2.0 * f64::from(i), 0.0, 1.0, 1.0))
        .collect();
    let bvh = Bvh::new(&cells);

    let predicates = vec![
        Predicate::nearest((4.5, 3.0), 3, ()),
        Predicate::nearest((30.0, 0.5), 2, ()),
        // More neighbours than cells: every cell comes back.
        Predicate::nearest((0.0, 0.0), 50, ()),
        Predicate::nearest((0.0, 0.0), 0, ()),
    ];

    for algorithm in [NearestAlgorithm::StackBased, NearestAlgorithm::PriorityQueue] {
        let policy = TraversalPolicy::default().with_nearest_algorithm(algorithm);
        let found = query_nearest_with_distances(&bvh, &predicates, &policy).unwrap();
        println!("{algorithm:?}");
        for i in 0..found.len() {
            if let Some((indices, distances)) = found.get(i) {
                println!("  predicate {i}: {indices:?} at {distances:.3?}");
            }
        }
    }

    let bad = vec![Predicate::nearest((0.0, 0.0), -1, ())];
    if let Err(e) = query_nearest_with_distances(&bvh, &bad, &TraversalPolicy::default()) {
        println!("rejected: {e}");
    }
}
