// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary bounding hierarchy, bulk-built with SAH-like splits.

use alloc::collections::BinaryHeap;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::{Ordering, Reverse};
use core::fmt::Debug;

use kurbo::Point;

use crate::geometry::Region;
use crate::traverse::{NearestAlgorithm, Traverse};
use crate::types::{Aabb, union_all};

/// A BVH over a fixed set of primitive boxes.
///
/// Primitive `i` is `boxes[i]` from construction. The tree is immutable once built and
/// can be traversed from many threads concurrently.
pub struct Bvh {
    max_leaf: usize,
    root: Option<NodeIdx>,
    arena: Vec<Node>,
    primitives: Vec<Aabb>,
}

enum Kind {
    Leaf(Vec<usize>),
    Internal { left: NodeIdx, right: NodeIdx },
}

struct Node {
    bbox: Aabb,
    kind: Kind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct NodeIdx(usize);

impl NodeIdx {
    const fn new(i: usize) -> Self {
        Self(i)
    }

    const fn get(self) -> usize {
        self.0
    }
}

/// Default maximum number of primitives per leaf.
pub const DEFAULT_MAX_LEAF: usize = 8;

type BvhItem = (usize, Aabb);

impl Bvh {
    /// Build a hierarchy over `boxes` with the default leaf size.
    pub fn new(boxes: &[Aabb]) -> Self {
        Self::with_max_leaf(boxes, DEFAULT_MAX_LEAF)
    }

    /// Build a hierarchy over `boxes` with at most `max_leaf` primitives per leaf.
    ///
    /// `max_leaf` is clamped to at least 2.
    pub fn with_max_leaf(boxes: &[Aabb], max_leaf: usize) -> Self {
        let max_leaf = max_leaf.max(2);
        let mut arena = Vec::new();
        let items: Vec<BvhItem> = boxes.iter().copied().enumerate().collect();
        let root = if items.is_empty() {
            None
        } else {
            Some(Self::build(&mut arena, items, max_leaf))
        };
        log::debug!(
            "built BVH over {} primitives with {} nodes",
            boxes.len(),
            arena.len()
        );
        Self {
            max_leaf,
            root,
            arena,
            primitives: boxes.to_vec(),
        }
    }

    /// Bounding box of primitive `i`.
    pub fn primitive(&self, i: usize) -> Option<&Aabb> {
        self.primitives.get(i)
    }

    /// All primitive boxes, indexed by primitive id.
    pub fn primitives(&self) -> &[Aabb] {
        &self.primitives
    }

    fn build(arena: &mut Vec<Node>, items: Vec<BvhItem>, max_leaf: usize) -> NodeIdx {
        let bbox = union_all(items.iter().map(|(_, b)| *b))
            .unwrap_or(Aabb::new(0.0, 0.0, 0.0, 0.0));
        let idx = NodeIdx::new(arena.len());
        if items.len() <= max_leaf {
            arena.push(Node {
                bbox,
                kind: Kind::Leaf(items.into_iter().map(|(s, _)| s).collect()),
            });
            return idx;
        }
        // Reserve the slot so the parent precedes its children in the arena.
        arena.push(Node {
            bbox,
            kind: Kind::Leaf(Vec::new()),
        });
        let (l, r) = Self::split_sah(items, max_leaf);
        let left = Self::build(arena, l, max_leaf);
        let right = Self::build(arena, r, max_leaf);
        arena[idx.get()].kind = Kind::Internal { left, right };
        idx
    }

    fn sort_along(items: &mut [BvhItem], axis: usize) {
        items.sort_by(|a, b| {
            let (ca, cb) = (a.1.center(), b.1.center());
            let (va, vb) = if axis == 0 { (ca.x, cb.x) } else { (ca.y, cb.y) };
            va.partial_cmp(&vb)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
    }

    /// SAH-like split: sort along an axis, precompute prefix/suffix AABBs, and
    /// choose `k` that minimizes `area(LB_k) * k + area(RB_k) * (n - k)`.
    fn split_sah(mut items: Vec<BvhItem>, max_leaf: usize) -> (Vec<BvhItem>, Vec<BvhItem>) {
        let n = items.len();
        let min_children = (max_leaf / 2).max(1).min(n / 2);
        let mut best: Option<(f64, usize, usize)> = None;
        for axis in 0..2 {
            Self::sort_along(&mut items, axis);

            // Precompute prefix/suffix bboxes for O(1) split evaluation
            let mut prefix: Vec<Aabb> = Vec::with_capacity(n);
            for (_, bb) in &items {
                let next = prefix.last().map_or(*bb, |prev| prev.union(bb));
                prefix.push(next);
            }
            let mut suffix: Vec<Aabb> = Vec::with_capacity(n);
            for (_, bb) in items.iter().rev() {
                let next = suffix.last().map_or(*bb, |prev| prev.union(bb));
                suffix.push(next);
            }
            suffix.reverse();

            for k in min_children..=(n - min_children) {
                let lb = prefix[k - 1];
                let rb = suffix[k];
                #[allow(
                    clippy::cast_precision_loss,
                    reason = "Item counts are far below 2^52."
                )]
                let cost = lb.area() * k as f64 + rb.area() * (n - k) as f64;
                if best.is_none_or(|(bc, _, _)| cost < bc) {
                    best = Some((cost, axis, k));
                }
            }
        }
        let (axis, k) = best.map_or((0, n / 2), |(_, axis, k)| (axis, k));
        Self::sort_along(&mut items, axis);
        let right = items.split_off(k);
        (items, right)
    }

    fn nearest_stack(&self, root: NodeIdx, p: Point, k: usize) -> Vec<Candidate> {
        // Ascending by (distance, primitive); never longer than k.
        let mut best: Vec<Candidate> = Vec::with_capacity(k);
        let mut stack = vec![(root, self.arena[root.get()].bbox.distance_sq_to_point(p))];
        while let Some((i, bound)) = stack.pop() {
            if best.len() == k && best.last().is_some_and(|w| bound > w.dist_sq) {
                continue;
            }
            match &self.arena[i.get()].kind {
                Kind::Leaf(items) => {
                    for &s in items {
                        let c = Candidate {
                            dist_sq: self.primitives[s].distance_sq_to_point(p),
                            primitive: s,
                        };
                        if best.len() < k {
                            let at = best.partition_point(|b| *b < c);
                            best.insert(at, c);
                        } else if best.last().is_some_and(|w| c < *w) {
                            best.pop();
                            let at = best.partition_point(|b| *b < c);
                            best.insert(at, c);
                        }
                    }
                }
                Kind::Internal { left, right } => {
                    let dl = self.arena[left.get()].bbox.distance_sq_to_point(p);
                    let dr = self.arena[right.get()].bbox.distance_sq_to_point(p);
                    // Push the farther child first so the nearer one is explored first.
                    if dl <= dr {
                        stack.push((*right, dr));
                        stack.push((*left, dl));
                    } else {
                        stack.push((*left, dl));
                        stack.push((*right, dr));
                    }
                }
            }
        }
        best
    }

    fn nearest_heap(&self, root: NodeIdx, p: Point, k: usize) -> Vec<Candidate> {
        let mut best: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse(Frontier {
            bound: self.arena[root.get()].bbox.distance_sq_to_point(p),
            node: root,
        }));
        while let Some(Reverse(f)) = frontier.pop() {
            if best.len() == k && best.peek().is_some_and(|w| f.bound > w.dist_sq) {
                // Every remaining node is at least this far away.
                break;
            }
            match &self.arena[f.node.get()].kind {
                Kind::Leaf(items) => {
                    for &s in items {
                        let c = Candidate {
                            dist_sq: self.primitives[s].distance_sq_to_point(p),
                            primitive: s,
                        };
                        if best.len() < k {
                            best.push(c);
                        } else if best.peek().is_some_and(|w| c < *w) {
                            best.pop();
                            best.push(c);
                        }
                    }
                }
                Kind::Internal { left, right } => {
                    for child in [*left, *right] {
                        frontier.push(Reverse(Frontier {
                            bound: self.arena[child.get()].bbox.distance_sq_to_point(p),
                            node: child,
                        }));
                    }
                }
            }
        }
        best.into_sorted_vec()
    }
}

/// A neighbour candidate, ordered by `(dist_sq, primitive)`.
#[derive(Copy, Clone, Debug)]
struct Candidate {
    dist_sq: f64,
    primitive: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.primitive.cmp(&other.primitive))
    }
}

#[derive(Copy, Clone, Debug)]
struct Frontier {
    bound: f64,
    node: NodeIdx,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bound
            .total_cmp(&other.bound)
            .then(self.node.cmp(&other.node))
    }
}

impl Traverse for Bvh {
    fn bounds(&self) -> Option<Aabb> {
        self.root.map(|r| self.arena[r.get()].bbox)
    }

    fn size(&self) -> usize {
        self.primitives.len()
    }

    fn intersecting(&self, region: &Region, visit: &mut dyn FnMut(usize)) {
        let Some(root_idx) = self.root else {
            return;
        };
        let mut stack = vec![root_idx];
        while let Some(i) = stack.pop() {
            let n = &self.arena[i.get()];
            if !region.intersects(&n.bbox) {
                continue;
            }
            match &n.kind {
                Kind::Leaf(items) => {
                    for &s in items {
                        if region.intersects(&self.primitives[s]) {
                            visit(s);
                        }
                    }
                }
                Kind::Internal { left, right } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
    }

    fn nearest(
        &self,
        point: Point,
        k: usize,
        algorithm: NearestAlgorithm,
        visit: &mut dyn FnMut(usize, f64),
    ) {
        let Some(root_idx) = self.root else {
            return;
        };
        // Candidate buffers are sized by k, so never ask for more than exist.
        let k = k.min(self.primitives.len());
        if k == 0 {
            return;
        }
        let found = match algorithm {
            NearestAlgorithm::StackBased => self.nearest_stack(root_idx, point, k),
            NearestAlgorithm::PriorityQueue => self.nearest_heap(root_idx, point, k),
        };
        for c in found {
            visit(
                c.primitive,
                self.primitives[c.primitive].distance_to_point(point),
            );
        }
    }
}

impl Debug for Bvh {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bvh")
            .field("max_leaf", &self.max_leaf)
            .field("arena_nodes", &self.arena.len())
            .field("primitives", &self.primitives.len())
            .field("has_root", &self.root.is_some())
            .finish_non_exhaustive()
    }
}
