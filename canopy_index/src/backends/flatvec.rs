// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flat vector backend with linear scans. Small and simple; good for tiny sets and as an oracle.

use alloc::vec::Vec;
use core::fmt::Debug;

use kurbo::Point;

use crate::geometry::Region;
use crate::traverse::{NearestAlgorithm, Traverse};
use crate::types::{Aabb, union_all};

/// Flat vector backend with linear scans.
pub struct FlatVec {
    entries: Vec<Aabb>,
    bounds: Option<Aabb>,
}

impl FlatVec {
    /// Wrap a set of primitive boxes; primitive `i` is `boxes[i]`.
    pub fn new(boxes: &[Aabb]) -> Self {
        Self {
            entries: boxes.to_vec(),
            bounds: union_all(boxes.iter().copied()),
        }
    }
}

impl Debug for FlatVec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlatVec")
            .field("primitives", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Traverse for FlatVec {
    fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn intersecting(&self, region: &Region, visit: &mut dyn FnMut(usize)) {
        for (i, a) in self.entries.iter().enumerate() {
            if region.intersects(a) {
                visit(i);
            }
        }
    }

    fn nearest(
        &self,
        point: Point,
        k: usize,
        _algorithm: NearestAlgorithm,
        visit: &mut dyn FnMut(usize, f64),
    ) {
        let mut all: Vec<(f64, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, a)| (a.distance_sq_to_point(point), i))
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for &(_, i) in all.iter().take(k) {
            visit(i, self.entries[i].distance_to_point(point));
        }
    }
}
