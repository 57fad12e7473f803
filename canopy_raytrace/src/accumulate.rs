// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordered accumulation: what a ray gathers on its way through absorbing cells.
//!
//! Along a ray, cell `c` entered at optical depth `before` and left at depth `after`
//! contributes `w(c) * (exp(-before) - exp(-after))`: what the cell emits, attenuated
//! by everything between it and the ray origin. The order of cells therefore matters,
//! so each ray's segments are stable-sorted by entry distance before the walk. Equal
//! entry distances keep their input order.
//!
//! The same walk composes partial results: a partition that reports
//! `(entry, depth, contribution)` for a ray acts like one thick cell whose
//! contribution is attenuated by the depth of every partition before it.

use canopy_index::{Aabb, Bvh, Ray, Region};
use canopy_query::{
    Callback, Csr, Hit, PostCallback, Predicate, PredicateSource, TraversalPolicy, query,
};
use rayon::prelude::*;

use crate::error::RaytraceError;
use crate::grid::CellGrid;
use crate::intersect::Rays;
use crate::medium::{Emission, Medium};

/// What one ray gathered from one set of cells.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AggregatedRecord {
    /// Entry distance of the first cell crossed, `+inf` when none was.
    pub entry: f64,
    /// Total optical depth crossed.
    pub depth: f64,
    /// Gathered intensity, attenuated to the ray origin.
    pub contribution: f64,
}

impl AggregatedRecord {
    /// Record of a ray that crossed nothing.
    pub const EMPTY: Self = Self {
        entry: f64::INFINITY,
        depth: 0.0,
        contribution: 0.0,
    };

    /// True for the record of a ray that crossed nothing.
    pub fn is_empty(&self) -> bool {
        self.entry == f64::INFINITY
    }
}

/// A ray's passage through one cell.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Segment {
    /// Global id of the cell, passed to [`Emission::weight`].
    pub cell: usize,
    /// Distance from the ray origin to where it enters the cell.
    pub entry: f64,
    /// Optical depth of the passage.
    pub optical_path: f64,
}

/// Stable-sort `segments` by entry distance and walk them.
pub fn accumulate<E: Emission + ?Sized>(segments: &mut [Segment], emission: &E) -> AggregatedRecord {
    segments.sort_by(|a, b| a.entry.total_cmp(&b.entry));
    let Some(first) = segments.first() else {
        return AggregatedRecord::EMPTY;
    };
    let mut depth = 0.0;
    let mut contribution = 0.0;
    for s in segments.iter() {
        let before = depth;
        depth += s.optical_path;
        contribution += emission.weight(s.cell) * ((-before).exp() - (-depth).exp());
    }
    AggregatedRecord {
        entry: first.entry,
        depth,
        contribution,
    }
}

/// Intensity a ray gathers from partial records, applying the same ordered walk one
/// level up: `intensity += exp(-depth) * contribution`, then `depth += record depth`.
pub fn compose(records: &[AggregatedRecord]) -> f64 {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| a.entry.total_cmp(&b.entry));
    let mut depth: f64 = 0.0;
    let mut intensity = 0.0;
    for r in &sorted {
        intensity += (-depth).exp() * r.contribution;
        depth += r.depth;
    }
    intensity
}

/// Add each ray's absorbed power to the cell it started in.
///
/// `intensities` are grouped by origin cell, `rays_per_cell` at a time, starting at
/// cell `first_cell`.
pub fn deposit(
    energy: &mut [f64],
    first_cell: usize,
    rays_per_cell: usize,
    intensities: &[f64],
    medium: &Medium,
) {
    if rays_per_cell == 0 {
        return;
    }
    let factor = medium.deposit_factor(rays_per_cell);
    for (offset, rays) in intensities.chunks(rays_per_cell).enumerate() {
        if let Some(e) = energy.get_mut(first_cell + offset) {
            *e += factor * rays.iter().sum::<f64>();
        }
    }
}

/// Post-processing callback reducing each ray's hits to one [`AggregatedRecord`].
///
/// Predicates that are not rays get [`AggregatedRecord::EMPTY`].
pub struct OrderedAccumulation<'a, E: ?Sized> {
    boxes: &'a [Aabb],
    ids: Option<&'a [usize]>,
    medium: Medium,
    emission: &'a E,
}

impl<E: ?Sized> core::fmt::Debug for OrderedAccumulation<'_, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OrderedAccumulation")
            .field("boxes", &self.boxes.len())
            .field("medium", &self.medium)
            .finish_non_exhaustive()
    }
}

impl<'a, E: Emission + ?Sized> OrderedAccumulation<'a, E> {
    /// Accumulate over `boxes`, the primitives of the queried tree.
    pub fn new(boxes: &'a [Aabb], medium: Medium, emission: &'a E) -> Self {
        Self {
            boxes,
            ids: None,
            medium,
            emission,
        }
    }

    /// Global cell ids of the tree's primitives, for trees over a subset of a grid.
    #[must_use]
    pub fn with_cell_ids(mut self, ids: &'a [usize]) -> Self {
        self.ids = Some(ids);
        self
    }

    /// The record of one predicate given its hits.
    pub fn record<D>(&self, predicate: &Predicate<D>, hits: &[Hit]) -> AggregatedRecord {
        let Some(Region::Ray(ray)) = predicate.region() else {
            return AggregatedRecord::EMPTY;
        };
        let mut segments: Vec<Segment> = hits
            .iter()
            .filter_map(|hit| {
                let overlap = ray.overlap(self.boxes.get(hit.primitive)?)?;
                Some(Segment {
                    cell: self
                        .ids
                        .and_then(|ids| ids.get(hit.primitive).copied())
                        .unwrap_or(hit.primitive),
                    entry: overlap.entry,
                    optical_path: self.medium.optical_path(overlap.length),
                })
            })
            .collect();
        accumulate(&mut segments, self.emission)
    }
}

impl<D, E: Emission + ?Sized> PostCallback<D> for OrderedAccumulation<'_, E> {
    type Output = AggregatedRecord;

    fn process(&self, predicates: &dyn PredicateSource<D>, hits: Csr<Hit>) -> Csr<AggregatedRecord> {
        let records: Vec<AggregatedRecord> = (0..hits.len())
            .into_par_iter()
            .map(|i| self.record(&predicates.get(i), &hits[i]))
            .collect();
        Csr::one_each(records)
    }
}

/// Absorbed power per cell, tracing every ray through the whole grid in one process.
///
/// `rays` are grouped by origin cell as produced by [`CellGrid::sample_rays`].
pub fn absorbed_energy<E: Emission + ?Sized>(
    grid: &CellGrid,
    rays: &[Ray],
    rays_per_cell: usize,
    medium: &Medium,
    emission: &E,
    policy: &TraversalPolicy,
) -> Result<Vec<f64>, RaytraceError> {
    let boxes = grid.boxes();
    let bvh = Bvh::new(&boxes);
    let callback = Callback::post_process(OrderedAccumulation::new(&boxes, *medium, emission));
    let records = query(&bvh, &Rays::new(rays), &callback, policy)?;
    log::debug!(
        "{} of {} rays crossed no cell",
        records.values().iter().filter(|r| r.is_empty()).count(),
        rays.len()
    );
    let intensities: Vec<f64> = records.values().iter().map(|r| r.contribution).collect();
    let mut energy = vec![0.0; grid.cell_count()];
    deposit(&mut energy, 0, rays_per_cell, &intensities, medium);
    Ok(energy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{Point, Vec2};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn two_cells_in_closed_form() {
        let w = 2.0;
        // Given out of order; the walk must sort them.
        let mut segments = [
            Segment {
                cell: 1,
                entry: 1.0,
                optical_path: 2.0,
            },
            Segment {
                cell: 0,
                entry: 0.0,
                optical_path: 1.0,
            },
        ];
        let r = accumulate(&mut segments, &w);
        let e = core::f64::consts::E;
        let expected = w * (1.0 - 1.0 / e) + w * (1.0 / e - (-3.0_f64).exp());
        assert_eq!(r.entry, 0.0);
        assert_eq!(r.depth, 3.0);
        assert!(close(r.contribution, expected));
    }

    #[test]
    fn nothing_crossed_is_the_sentinel() {
        let r = accumulate(&mut [], &1.0_f64);
        assert_eq!(r, AggregatedRecord::EMPTY);
        assert!(r.is_empty());
        assert_eq!(r.depth, 0.0);
        assert_eq!(r.contribution, 0.0);
    }

    #[test]
    fn equal_entries_keep_input_order() {
        let weights: Vec<f64> = vec![1.0, 5.0];
        let seg = |cell| Segment {
            cell,
            entry: 0.5,
            optical_path: 1.0,
        };
        let a = accumulate(&mut [seg(0), seg(1)], &weights);
        let b = accumulate(&mut [seg(1), seg(0)], &weights);
        assert!(a.contribution < b.contribution);
    }

    #[test]
    fn composing_split_walks_matches_one_walk() {
        let w = 1.5;
        let all: Vec<Segment> = (0..6_u8)
            .map(|i| Segment {
                cell: usize::from(i),
                entry: f64::from(i),
                optical_path: 0.3 + 0.1 * f64::from(i),
            })
            .collect();
        let whole = accumulate(&mut all.clone(), &w);
        let near = accumulate(&mut all[..2].to_vec(), &w);
        let far = accumulate(&mut all[2..].to_vec(), &w);
        // Order of records does not matter, and empty records change nothing.
        let composed = compose(&[far, AggregatedRecord::EMPTY, near]);
        assert!(close(composed, whole.contribution));
    }

    #[test]
    fn post_callback_emits_one_record_per_ray() {
        let boxes = [Aabb::new(0.0, 0.0, 1.0, 1.0), Aabb::new(1.0, 0.0, 3.0, 1.0)];
        let bvh = Bvh::new(&boxes);
        let rays = [
            Ray::new(Point::new(0.0, 0.5), Vec2::new(1.0, 0.0)),
            Ray::new(Point::new(0.5, 5.0), Vec2::new(0.0, 1.0)),
        ];
        let w = 2.0;
        let callback = Callback::post_process(OrderedAccumulation::new(&boxes, Medium::new(1.0), &w));
        for size in [0, 1, -4] {
            let policy = TraversalPolicy::default().with_buffer_size(size);
            let records = query(&bvh, &Rays::new(&rays), &callback, &policy).unwrap();
            assert_eq!(records.offsets(), &[0, 1, 2]);
            assert_eq!(records[0][0].depth, 3.0);
            assert_eq!(records[1][0], AggregatedRecord::EMPTY);
        }
    }

    #[test]
    fn deposit_groups_rays_by_cell() {
        let mut energy = vec![0.0; 3];
        let m = Medium::new(1.0 / (4.0 * core::f64::consts::PI));
        deposit(&mut energy, 1, 2, &[1.0, 1.0, 2.0, 4.0], &m);
        assert!(close(energy[0], 0.0));
        assert!(close(energy[1], 1.0));
        assert!(close(energy[2], 3.0));
        deposit(&mut energy, 0, 0, &[1.0], &m);
        assert!(close(energy[0], 0.0));
    }
}
