// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Partitioned tracing.
//!
//! Cells are split into partitions, each with its own tree. A ray is routed to every
//! partition whose bounds it meets; each partition reduces the ray's local crossings
//! to one [`AggregatedRecord`], and the originating rank composes those records into
//! the ray's intensity. Ranks deposit into a full-size energy array that is then
//! summed across ranks with one blocking reduction.
//!
//! Composition is exact when every partition is convex, since a ray then crosses
//! each partition in one contiguous stretch.

use std::ops::Range;
use std::sync::{Arc, Barrier, Mutex, MutexGuard};

use canopy_index::types::union_all;
use canopy_index::{Aabb, Bvh, Ray};
use canopy_query::{Callback, Csr, Predicate, QueryError, TraversalPolicy, query, query_indices};
use rayon::prelude::*;

use crate::accumulate::{AggregatedRecord, OrderedAccumulation, compose, deposit};
use crate::error::RaytraceError;
use crate::grid::CellGrid;
use crate::intersect::Rays;
use crate::medium::{Emission, Medium};

/// A tree spread over partitions that answers ray batches with per-partition records.
pub trait DistributedTree: Sync {
    /// Number of partitions.
    fn partitions(&self) -> usize;

    /// For each ray, one record per partition whose bounds it meets. A partition
    /// whose bounds are met but whose cells are not reports
    /// [`AggregatedRecord::EMPTY`].
    fn trace(&self, rays: &[Ray], policy: &TraversalPolicy) -> Result<Csr<AggregatedRecord>, RaytraceError>;
}

struct Partition {
    /// Global cell ids, indexed by local primitive.
    ids: Vec<usize>,
    boxes: Vec<Aabb>,
    bvh: Bvh,
}

/// All partitions in one process, each with its own [`Bvh`], plus a top-level
/// [`Bvh`] over partition bounds used for routing.
pub struct LocalDistributedTree<E> {
    partitions: Vec<Partition>,
    top: Bvh,
    /// Partition index of each top-level primitive.
    owners: Vec<usize>,
    medium: Medium,
    emission: E,
}

impl<E> core::fmt::Debug for LocalDistributedTree<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalDistributedTree")
            .field("partitions", &self.partitions.len())
            .field("medium", &self.medium)
            .finish_non_exhaustive()
    }
}

impl<E: Emission> LocalDistributedTree<E> {
    /// Partition `grid` into the given lists of cell ids.
    pub fn new(
        grid: &CellGrid,
        partitions: Vec<Vec<usize>>,
        medium: Medium,
        emission: E,
    ) -> Result<Self, RaytraceError> {
        if partitions.iter().flatten().any(|&id| id >= grid.cell_count()) {
            return Err(RaytraceError::InvalidGrid(
                "partition names a cell outside the grid",
            ));
        }
        let partitions: Vec<Partition> = partitions
            .into_iter()
            .map(|ids| {
                let boxes: Vec<Aabb> = ids.iter().map(|&id| grid.cell_box(id)).collect();
                let bvh = Bvh::new(&boxes);
                Partition { ids, boxes, bvh }
            })
            .collect();
        let mut owners = Vec::new();
        let mut bounds = Vec::new();
        for (i, p) in partitions.iter().enumerate() {
            if let Some(b) = union_all(p.boxes.iter().copied()) {
                owners.push(i);
                bounds.push(b);
            }
        }
        log::debug!(
            "{} partitions, {} non-empty",
            partitions.len(),
            owners.len()
        );
        Ok(Self {
            top: Bvh::new(&bounds),
            partitions,
            owners,
            medium,
            emission,
        })
    }

    /// One horizontal strip of whole rows per rank; see [`CellGrid::row_strip`].
    pub fn from_row_strips(
        grid: &CellGrid,
        ranks: usize,
        medium: Medium,
        emission: E,
    ) -> Result<Self, RaytraceError> {
        if ranks == 0 {
            return Err(RaytraceError::InvalidPartitioning {
                rows: grid.ny(),
                ranks,
            });
        }
        let partitions = (0..ranks)
            .map(|r| grid.row_strip(r, ranks).map(|cells| cells.collect::<Vec<usize>>()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(grid, partitions, medium, emission)
    }
}

impl<E: Emission> DistributedTree for LocalDistributedTree<E> {
    fn partitions(&self) -> usize {
        self.partitions.len()
    }

    fn trace(&self, rays: &[Ray], policy: &TraversalPolicy) -> Result<Csr<AggregatedRecord>, RaytraceError> {
        let routes = query_indices(&self.top, &Rays::new(rays), policy)?;
        let mut routed: Vec<Vec<usize>> = vec![Vec::new(); self.partitions.len()];
        for (ray, tops) in routes.iter().enumerate() {
            for &t in tops {
                routed[self.owners[t]].push(ray);
            }
        }

        let local = self
            .partitions
            .par_iter()
            .zip(routed.par_iter())
            .map(|(p, ids)| -> Result<Vec<(usize, AggregatedRecord)>, QueryError> {
                let predicates: Vec<Predicate<usize>> = ids
                    .iter()
                    .map(|&r| Predicate::intersects(rays[r], r))
                    .collect();
                let callback = Callback::post_process(
                    OrderedAccumulation::new(&p.boxes, self.medium, &self.emission)
                        .with_cell_ids(&p.ids),
                );
                let records = query(&p.bvh, &predicates, &callback, policy)?;
                Ok(ids.iter().copied().zip(records.values().iter().copied()).collect())
            })
            .collect::<Result<Vec<Vec<(usize, AggregatedRecord)>>, QueryError>>()?;

        let mut per_ray: Vec<Vec<AggregatedRecord>> = vec![Vec::new(); rays.len()];
        for (ray, record) in local.into_iter().flatten() {
            per_ray[ray].push(record);
        }
        Ok(per_ray.into_iter().collect())
    }
}

/// A blocking element-wise sum over every rank.
pub trait Reduce: Sync {
    /// This rank.
    fn rank(&self) -> usize;

    /// Number of ranks taking part.
    fn ranks(&self) -> usize;

    /// Replace `values` with the sum of every rank's `values`. Blocks until all ranks
    /// have contributed; fails on every rank if any rank's length differs.
    fn sum(&self, values: &mut [f64]) -> Result<(), RaytraceError>;
}

#[derive(Debug, Default)]
struct ReduceState {
    total: Vec<f64>,
    contributed: usize,
    mismatch: Option<(usize, usize)>,
}

#[derive(Debug)]
struct Shared {
    ranks: usize,
    barrier: Barrier,
    state: Mutex<ReduceState>,
}

/// In-process ranks sharing one reduction; hand one to each thread.
#[derive(Clone, Debug)]
pub struct LocalCommunicator {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalCommunicator {
    /// Handles for `ranks` ranks.
    pub fn group(ranks: usize) -> Vec<Self> {
        let shared = Arc::new(Shared {
            ranks,
            barrier: Barrier::new(ranks),
            state: Mutex::new(ReduceState::default()),
        });
        (0..ranks)
            .map(|rank| Self {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn lock(&self, poisoned: &mut bool) -> MutexGuard<'_, ReduceState> {
        self.shared.state.lock().unwrap_or_else(|e| {
            *poisoned = true;
            e.into_inner()
        })
    }
}

impl Reduce for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn ranks(&self) -> usize {
        self.shared.ranks
    }

    fn sum(&self, values: &mut [f64]) -> Result<(), RaytraceError> {
        let mut poisoned = false;
        {
            let mut state = self.lock(&mut poisoned);
            if state.contributed == 0 {
                state.total = values.to_vec();
            } else if state.total.len() != values.len() {
                if state.mismatch.is_none() {
                    state.mismatch = Some((state.total.len(), values.len()));
                }
            } else {
                for (t, v) in state.total.iter_mut().zip(values.iter()) {
                    *t += v;
                }
            }
            state.contributed += 1;
        }
        self.shared.barrier.wait();

        let outcome = {
            let state = self.lock(&mut poisoned);
            match state.mismatch {
                Some((expected, found)) => Err(RaytraceError::Reduction {
                    rank: self.rank,
                    reason: format!("expected {expected} values, a rank sent {found}"),
                }),
                None => {
                    values.copy_from_slice(&state.total);
                    Ok(())
                }
            }
        };

        // Every rank has read the total before it is cleared for the next round.
        if self.shared.barrier.wait().is_leader() {
            *self.lock(&mut poisoned) = ReduceState::default();
        }
        self.shared.barrier.wait();

        if poisoned {
            return Err(RaytraceError::Reduction {
                rank: self.rank,
                reason: "a rank panicked while holding the reduction lock".into(),
            });
        }
        outcome
    }
}

/// This rank's share of the absorbed power, summed over every rank.
///
/// `rays` are the rays originating on this rank, grouped by origin cell starting at
/// `first_cell`. The returned array covers the whole grid and is identical on every
/// rank. If tracing fails locally the rank still joins the reduction, with a
/// mismatching contribution, so that no rank is left waiting.
pub fn absorbed_energy_on_rank<T, R>(
    tree: &T,
    comm: &R,
    grid: &CellGrid,
    rays: &[Ray],
    first_cell: usize,
    rays_per_cell: usize,
    medium: &Medium,
    policy: &TraversalPolicy,
) -> Result<Vec<f64>, RaytraceError>
where
    T: DistributedTree + ?Sized,
    R: Reduce + ?Sized,
{
    let local = tree.trace(rays, policy).map(|records| {
        let intensities: Vec<f64> = records.iter().map(compose).collect();
        let mut energy = vec![0.0; grid.cell_count()];
        deposit(&mut energy, first_cell, rays_per_cell, &intensities, medium);
        energy
    });
    match local {
        Ok(mut energy) => {
            comm.sum(&mut energy)?;
            log::debug!(
                "rank {} of {}: {} rays composed and reduced",
                comm.rank(),
                comm.ranks(),
                rays.len()
            );
            Ok(energy)
        }
        Err(e) => {
            if let Err(r) = comm.sum(&mut []) {
                log::debug!("rank {} abandoned the reduction: {r}", comm.rank());
            }
            Err(e)
        }
    }
}

/// Absorbed power per cell, traced over `ranks` row-strip partitions, one thread per
/// rank.
///
/// `rays` must hold `rays_per_cell` rays per cell, grouped by origin cell.
pub fn absorbed_energy_distributed<E: Emission>(
    grid: &CellGrid,
    rays: &[Ray],
    rays_per_cell: usize,
    ranks: usize,
    medium: &Medium,
    emission: E,
    policy: &TraversalPolicy,
) -> Result<Vec<f64>, RaytraceError> {
    if rays.len() != grid.cell_count() * rays_per_cell {
        return Err(RaytraceError::InvalidGrid(
            "ray count does not match cells times rays per cell",
        ));
    }
    let tree = LocalDistributedTree::from_row_strips(grid, ranks, *medium, emission)?;
    let strips: Vec<Range<usize>> = (0..ranks)
        .map(|r| grid.row_strip(r, ranks))
        .collect::<Result<_, _>>()?;
    let comms = LocalCommunicator::group(ranks);

    let results: Vec<Result<Vec<f64>, RaytraceError>> = std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .zip(&strips)
            .map(|(comm, cells)| {
                let tree = &tree;
                let own = &rays[cells.start * rays_per_cell..cells.end * rays_per_cell];
                s.spawn(move || {
                    absorbed_energy_on_rank(
                        tree,
                        comm,
                        grid,
                        own,
                        cells.start,
                        rays_per_cell,
                        medium,
                        policy,
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join().unwrap_or_else(|_| {
                    Err(RaytraceError::Reduction {
                        rank,
                        reason: "rank thread panicked".into(),
                    })
                })
            })
            .collect()
    });

    // A failing rank makes the others report a reduction error; surface its own error.
    let mut energy = None;
    let mut failure = None;
    for r in results {
        match r {
            Ok(e) => {
                energy.get_or_insert(e);
            }
            Err(e @ RaytraceError::Reduction { .. }) => {
                failure.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }
    Ok(energy.unwrap_or_else(|| vec![0.0; grid.cell_count()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{Point, Vec2};

    #[test]
    fn ranks_agree_on_the_sum() {
        let comms = LocalCommunicator::group(3);
        let sums: Vec<Vec<f64>> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let mut v = vec![1.0, 1.0];
                        c.sum(&mut v).unwrap();
                        // A second round starts from a clean slate.
                        let mut w = vec![1.0];
                        c.sum(&mut w).unwrap();
                        v.push(w[0]);
                        v
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for v in sums {
            assert_eq!(v, vec![3.0, 3.0, 3.0]);
        }
    }

    #[test]
    fn length_mismatch_fails_everywhere() {
        let comms = LocalCommunicator::group(2);
        let outcomes: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let mut v = vec![0.0; 2 + c.rank()];
                        c.sum(&mut v).is_err()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(outcomes, vec![true, true]);
    }

    #[test]
    fn rays_get_one_record_per_partition_met() {
        // Two columns of a 4 x 1 grid.
        let grid = CellGrid::new(4, 1, 4.0, 1.0).unwrap();
        let tree = LocalDistributedTree::new(&grid, vec![vec![0, 1], vec![2, 3]], Medium::new(1.0), 1.0)
            .unwrap();
        assert_eq!(tree.partitions(), 2);
        let rays = [
            Ray::new(Point::new(0.5, 0.5), Vec2::new(1.0, 0.0)),
            Ray::new(Point::new(3.5, 0.5), Vec2::new(1.0, 0.0)),
            Ray::new(Point::new(0.5, 3.0), Vec2::new(1.0, 0.0)),
        ];
        let records = tree.trace(&rays, &TraversalPolicy::default()).unwrap();
        assert_eq!(records.counts(), vec![2, 1, 0]);

        let composed = compose(&records[0]);
        let e = |x: f64| (-x).exp();
        let single = 1.0 - e(3.5);
        assert!((composed - single).abs() < 1e-12);
        assert_eq!(compose(&records[2]), 0.0);
    }

    #[test]
    fn cells_outside_the_grid_are_rejected() {
        let grid = CellGrid::new(2, 1, 2.0, 1.0).unwrap();
        assert!(LocalDistributedTree::new(&grid, vec![vec![0, 2]], Medium::default(), 1.0).is_err());
    }
}
