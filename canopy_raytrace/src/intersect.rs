// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ray batches and per-cell intersection records.
//!
//! [`RayCellIntersections`] stores every ray/cell crossing during traversal. The
//! records can then be ordered globally and reduced per ray
//! ([`aggregate_intersections`]), or used to deposit a forward-travelling ray's
//! energy cell by cell ([`forward_deposit`]).

use canopy_index::{Aabb, Ray, Region};
use canopy_query::{Hit, InlineCallback, Predicate, PredicateSource};
use rayon::prelude::*;

use crate::accumulate::{AggregatedRecord, Segment, accumulate};
use crate::medium::{Emission, Medium};

/// A batch of rays as spatial predicates; each carries its own index as payload.
#[derive(Copy, Clone, Debug)]
pub struct Rays<'a> {
    rays: &'a [Ray],
}

impl<'a> Rays<'a> {
    /// Wrap a slice of rays.
    pub fn new(rays: &'a [Ray]) -> Self {
        Self { rays }
    }
}

impl PredicateSource<usize> for Rays<'_> {
    fn size(&self) -> usize {
        self.rays.len()
    }

    fn get(&self, i: usize) -> Predicate<usize> {
        Predicate::intersects(self.rays[i], i)
    }
}

/// One ray crossing one cell.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntersectedCell {
    /// Ray id (the predicate payload).
    pub ray: usize,
    /// Cell id (the primitive index).
    pub cell: usize,
    /// Distance from the ray origin to the cell.
    pub entry: f64,
    /// Optical depth of the crossing.
    pub optical_path: f64,
}

/// Inline callback emitting an [`IntersectedCell`] per hit.
#[derive(Copy, Clone, Debug)]
pub struct RayCellIntersections<'a> {
    boxes: &'a [Aabb],
    medium: Medium,
}

impl<'a> RayCellIntersections<'a> {
    /// Intersect against `boxes`, the primitives of the queried tree.
    pub fn new(boxes: &'a [Aabb], medium: Medium) -> Self {
        Self { boxes, medium }
    }
}

impl InlineCallback<usize> for RayCellIntersections<'_> {
    type Output = IntersectedCell;

    fn on_hit(&self, predicate: &Predicate<usize>, hit: Hit, emit: &mut dyn FnMut(IntersectedCell)) {
        let Some(Region::Ray(ray)) = predicate.region() else {
            return;
        };
        if let Some(o) = self.boxes.get(hit.primitive).and_then(|b| ray.overlap(b)) {
            emit(IntersectedCell {
                ray: *predicate.data(),
                cell: hit.primitive,
                entry: o.entry,
                optical_path: self.medium.optical_path(o.length),
            });
        }
    }
}

/// Stable parallel sort by `(ray, entry)`; equal keys keep their input order.
pub fn sort_intersections(records: &mut [IntersectedCell]) {
    records.par_sort_by(|a, b| a.ray.cmp(&b.ray).then(a.entry.total_cmp(&b.entry)));
}

/// One [`AggregatedRecord`] per ray in `0..rays`, from unordered crossings.
pub fn aggregate_intersections<E: Emission + ?Sized>(
    mut records: Vec<IntersectedCell>,
    rays: usize,
    emission: &E,
) -> Vec<AggregatedRecord> {
    sort_intersections(&mut records);
    let mut out = vec![AggregatedRecord::EMPTY; rays];
    for crossings in records.chunk_by(|a, b| a.ray == b.ray) {
        let mut segments: Vec<Segment> = crossings
            .iter()
            .map(|c| Segment {
                cell: c.cell,
                entry: c.entry,
                optical_path: c.optical_path,
            })
            .collect();
        if let Some(slot) = out.get_mut(crossings[0].ray) {
            *slot = accumulate(&mut segments, emission);
        }
    }
    out
}

/// Energy left behind by rays that carry energy forward and lose
/// `remaining * (1 - exp(-optical_path))` in each cell they cross.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardDeposit {
    /// Energy absorbed per cell.
    pub absorbed: Vec<f64>,
    /// Energy carried out of the domain.
    pub escaped: f64,
}

/// Deposit `ray_energy` per ray along its crossings, in order of entry.
///
/// Every ray in `0..rays` starts with `ray_energy`; rays without crossings escape
/// with all of it.
pub fn forward_deposit(
    records: &mut [IntersectedCell],
    rays: usize,
    ray_energy: f64,
    cells: usize,
) -> ForwardDeposit {
    sort_intersections(records);
    let mut absorbed = vec![0.0; cells];
    let mut escaped = 0.0;
    let mut seen = 0;
    for crossings in records.chunk_by(|a, b| a.ray == b.ray) {
        if crossings[0].ray >= rays {
            continue;
        }
        seen += 1;
        let mut remaining = ray_energy;
        for c in crossings {
            let lost = -remaining * (-c.optical_path).exp_m1();
            if let Some(e) = absorbed.get_mut(c.cell) {
                *e += lost;
            }
            remaining -= lost;
        }
        escaped += remaining;
    }
    #[allow(
        clippy::cast_precision_loss,
        reason = "ray counts are far below 2^52"
    )]
    let untouched = (rays - seen) as f64;
    escaped += untouched * ray_energy;
    ForwardDeposit { absorbed, escaped }
}
