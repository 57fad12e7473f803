// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The traversal capability a query engine consumes.

use kurbo::Point;

use crate::geometry::Region;
use crate::types::Aabb;

/// Choice of k-nearest traversal.
///
/// Both algorithms return the same neighbours in the same order; they differ only
/// in how the search frontier is kept.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum NearestAlgorithm {
    /// Depth-first walk with an explicit stack, pruning on the current k-th best distance.
    #[default]
    StackBased,
    /// Best-first walk with a min-heap of nodes and a max-heap of the k best candidates.
    PriorityQueue,
}

/// A read-only spatial hierarchy over primitives identified by their position `0..size()`.
///
/// Implementations may be queried from many threads at once.
pub trait Traverse: Sync {
    /// Bounds of every primitive, or `None` when the tree is empty.
    fn bounds(&self) -> Option<Aabb>;

    /// Number of primitives.
    fn size(&self) -> usize;

    /// Whether the tree holds no primitives.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Call `visit` once for every primitive whose box satisfies `region`.
    ///
    /// Visit order is unspecified.
    fn intersecting(&self, region: &Region, visit: &mut dyn FnMut(usize));

    /// Call `visit(primitive, distance)` for the `min(k, size())` primitives nearest to `point`.
    ///
    /// Neighbours are reported in ascending `(distance, primitive)` order, so ties in
    /// distance go to the lower primitive index.
    fn nearest(
        &self,
        point: Point,
        k: usize,
        algorithm: NearestAlgorithm,
        visit: &mut dyn FnMut(usize, f64),
    );
}
