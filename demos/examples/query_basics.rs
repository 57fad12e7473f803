// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Query basics.
//!
//! Run spatial predicates over a small grid under each buffer policy, with a custom
//! inline callback and a post-processing callback.
//!
//! Run:
//! - `RUST_LOG=debug cargo run -p canopy_demos --example query_basics`

use canopy_index::{Aabb, Bvh, Ray};
use canopy_query::{
    Callback, Csr, Hit, InlineCallback, PostCallback, Predicate, PredicateSource, QueryError,
    TraversalPolicy, query, query_indices,
};
use kurbo::{Circle, Point, Vec2};

/// Emits the matched cell's center instead of its index.
struct Centers<'a>(&'a [Aabb]);

impl InlineCallback<&'static str> for Centers<'_> {
    type Output = Point;

    fn on_hit(&self, _: &Predicate<&'static str>, hit: Hit, emit: &mut dyn FnMut(Point)) {
        emit(self.0[hit.primitive].center());
    }
}

/// Keeps only the lowest cell index per predicate.
struct Lowest;

impl PostCallback<&'static str> for Lowest {
    type Output = usize;

    fn process(&self, _: &dyn PredicateSource<&'static str>, hits: Csr<Hit>) -> Csr<usize> {
        hits.iter()
            .map(|h| h.iter().map(|hit| hit.primitive).min().into_iter().collect())
            .collect()
    }
}

fn main() {
    env_logger::init();

    // An 8 x 8 grid of unit cells.
    let cells: Vec<Aabb> = (0..64_u8)
        .map(|i| Aabb::from_xywh(f64::from(i % 8), f64::from(i / 8), 1.0, 1.0))
        .collect();
    let bvh = Bvh::new(&cells);

    let predicates = vec![
        Predicate::intersects(Aabb::new(1.5, 1.5, 3.5, 2.5), "rect"),
        Predicate::intersects(Circle::new((6.0, 6.0), 0.9), "circle"),
        Predicate::intersects(Ray::new(Point::new(0.5, 7.5), Vec2::new(1.0, 0.0)), "ray"),
        Predicate::intersects(Point::new(20.0, 20.0), "outside"),
    ];

    for size in [0, 2, -16] {
        let policy = TraversalPolicy::default().with_buffer_size(size);
        let hits = query_indices(&bvh, &predicates, &policy).unwrap();
        println!("buffer {size:>3}: counts {:?}", hits.counts());
    }

    // A failing buffer that is too small names the predicates that needed more room.
    let policy = TraversalPolicy::default().with_buffer_size(-2);
    match query_indices(&bvh, &predicates, &policy) {
        Err(e @ QueryError::BufferOverflow { .. }) => {
            println!("{e}; overflowing: {:?}", e.overflowing_predicates());
        }
        other => println!("unexpected: {other:?}"),
    }

    let policy = TraversalPolicy::default();
    let centers = query(&bvh, &predicates, &Callback::inline(Centers(&cells)), &policy).unwrap();
    for (p, found) in predicates.iter().zip(centers.iter()) {
        println!("{:>8}: {} centers, first {:?}", p.data(), found.len(), found.first());
    }

    let lowest = query(&bvh, &predicates, &Callback::post_process(Lowest), &policy).unwrap();
    assert_eq!(lowest.offsets(), &[0, 1, 2, 3, 3]);
    println!("lowest cells: {:?}", lowest.values());
}
