// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Basic usage of Canopy Index: build a hierarchy, cast a ray, ask for neighbours.

use canopy_index::{Aabb, Bvh, NearestAlgorithm, Ray, Region, Traverse};
use kurbo::{Point, Vec2};

fn main() {
    let mut cells = Vec::new();
    for y in 0..4 {
        for x in 0..4 {
            cells.push(Aabb::from_xywh(x as f64, y as f64, 1.0, 1.0));
        }
    }
    let bvh = Bvh::new(&cells);
    println!("{bvh:?}, bounds = {:?}", bvh.bounds());

    // Cast a diagonal ray and report entry distances.
    let ray = Ray::new(Point::new(0.1, 0.2), Vec2::new(1.0, 1.0));
    let mut hits = Vec::new();
    bvh.intersecting(&Region::Ray(ray), &mut |i| hits.push(i));
    hits.sort_by(|a, b| {
        let ea = ray.overlap(&cells[*a]).map_or(f64::INFINITY, |o| o.entry);
        let eb = ray.overlap(&cells[*b]).map_or(f64::INFINITY, |o| o.entry);
        ea.total_cmp(&eb)
    });
    for i in hits {
        if let Some(o) = ray.overlap(&cells[i]) {
            println!("cell {i:2}: entry {:.3}, length {:.3}", o.entry, o.length);
        }
    }

    // Three nearest cells to a point outside the grid.
    bvh.nearest(
        Point::new(5.0, 1.5),
        3,
        NearestAlgorithm::StackBased,
        &mut |i, d| println!("neighbour {i:2} at distance {d:.3}"),
    );
}
