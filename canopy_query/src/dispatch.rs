// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Query entry points.
//!
//! A call runs in four steps:
//!
//! 1. Validate the batch: one predicate kind throughout, no negative `k`.
//! 2. Pick a traversal order: Z-order over the tree's bounds when sorting is enabled,
//!    caller order otherwise.
//! 3. Build the pipeline for the batch's kind and resolve a buffering plan.
//! 4. Let the buffer engine run the traversal and assemble results in caller order.
//!
//! Post-processing callbacks run once on top of step 4, fed with every [`Hit`].

use canopy_index::{NearestAlgorithm, Region, Traverse};
use kurbo::Point;
use rayon::prelude::*;

use crate::buffer::{self, Plan};
use crate::callback::{Callback, Hit, HitRecord, InlineCallback, PostCallback, PrimitiveIndex};
use crate::csr::Csr;
use crate::error::QueryError;
use crate::permutation::{Identity, Permutation, SlotMap};
use crate::policy::{BufferPolicy, OnOverflow, TraversalPolicy};
use crate::predicate::{Predicate, PredicateKind, PredicateSource};
use crate::reorder;

/// Run `predicates` against `tree` and store what `callback` produces per predicate.
///
/// Results come back in caller order, whatever order traversal used. An empty batch
/// yields a result with a single zero offset; a post-processing callback is still
/// invoked once for it.
pub fn query<T, S, D, I, P, V>(
    tree: &T,
    predicates: &S,
    callback: &Callback<I, P>,
    policy: &TraversalPolicy,
) -> Result<Csr<V>, QueryError>
where
    T: Traverse,
    S: PredicateSource<D>,
    D: Clone + Send + Sync,
    I: InlineCallback<D, Output = V>,
    P: PostCallback<D, Output = V>,
    V: Send,
{
    match callback {
        Callback::Inline(inline) => run(tree, predicates, inline, policy),
        Callback::PostProcess(post) => {
            let hits = run(tree, predicates, &HitRecord, policy)?;
            log::trace!("post-processing {} hits", hits.total());
            Ok(post.process(predicates, hits))
        }
    }
}

/// Indices of the primitives each predicate matches.
pub fn query_indices<T, S, D>(
    tree: &T,
    predicates: &S,
    policy: &TraversalPolicy,
) -> Result<Csr<usize>, QueryError>
where
    T: Traverse,
    S: PredicateSource<D>,
    D: Clone + Send + Sync,
{
    run(tree, predicates, &PrimitiveIndex, policy)
}

/// Nearest-neighbour results split into parallel index and distance arrays.
#[derive(Clone, Debug, PartialEq)]
pub struct NearestNeighbors {
    /// One more entry than there are predicates.
    pub offsets: Vec<usize>,
    /// Primitive indices, closest first within each predicate.
    pub indices: Vec<usize>,
    /// Distance of each entry of `indices` from its query point.
    pub distances: Vec<f64>,
}

impl NearestNeighbors {
    /// Number of predicates.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// True when the batch had no predicates.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices and distances of predicate `i`'s neighbours.
    pub fn get(&self, i: usize) -> Option<(&[usize], &[f64])> {
        let start = *self.offsets.get(i)?;
        let end = *self.offsets.get(i + 1)?;
        Some((&self.indices[start..end], &self.distances[start..end]))
    }
}

/// Run a batch of nearest predicates and return neighbour indices with distances.
///
/// A batch of spatial predicates is rejected before traversal, since its matches
/// carry no distance.
pub fn query_nearest_with_distances<T, S, D>(
    tree: &T,
    predicates: &S,
    policy: &TraversalPolicy,
) -> Result<NearestNeighbors, QueryError>
where
    T: Traverse,
    S: PredicateSource<D>,
    D: Clone + Send + Sync,
{
    if predicates.size() > 0 {
        let kind = predicates.get(0).kind();
        if kind != PredicateKind::Nearest {
            return Err(QueryError::IncompatibleCallback {
                callback: "query_nearest_with_distances",
                kind,
            });
        }
    }
    let (offsets, hits) = run(tree, predicates, &HitRecord, policy)?.into_parts();
    let (indices, distances): (Vec<usize>, Vec<f64>) = hits
        .par_iter()
        .map(|h| (h.primitive, h.distance.unwrap_or(0.0)))
        .unzip();
    Ok(NearestNeighbors {
        offsets,
        indices,
        distances,
    })
}

/// Validate, reorder, and execute with an inline callback.
fn run<T, S, D, C>(
    tree: &T,
    source: &S,
    callback: &C,
    policy: &TraversalPolicy,
) -> Result<Csr<C::Output>, QueryError>
where
    T: Traverse,
    S: PredicateSource<D>,
    D: Clone + Send + Sync,
    C: InlineCallback<D>,
{
    let batch: Vec<Predicate<D>> = (0..source.size()).map(|i| source.get(i)).collect();
    let Some(kind) = batch.first().map(Predicate::kind) else {
        return Ok(Csr::empty(0));
    };
    let pipeline = match kind {
        PredicateKind::Spatial => Pipeline::spatial(&batch)?,
        PredicateKind::Nearest => Pipeline::nearest(&batch, tree.size(), policy.nearest_algorithm)?,
    };
    let plan = pipeline.plan(policy.buffer())?;

    match tree.bounds() {
        Some(bounds) if policy.sort_predicates => {
            let order = reorder::z_order(&bounds, &batch);
            log::debug!(
                "running {} {kind} predicates in Z-order, plan {:?}",
                batch.len(),
                PlanSummary(&plan)
            );
            let ordered = order.apply(&batch);
            let pipeline = pipeline.permuted(&order);
            execute(tree, &ordered, &pipeline, &order, callback, plan)
        }
        _ => {
            log::debug!(
                "running {} {kind} predicates in caller order, plan {:?}",
                batch.len(),
                PlanSummary(&plan)
            );
            let identity = Identity(batch.len());
            execute(tree, &batch, &pipeline, &identity, callback, plan)
        }
    }
}

fn execute<T, D, M, C>(
    tree: &T,
    ordered: &[Predicate<D>],
    pipeline: &Pipeline,
    slots: &M,
    callback: &C,
    plan: Plan,
) -> Result<Csr<C::Output>, QueryError>
where
    T: Traverse,
    D: Sync,
    M: SlotMap,
    C: InlineCallback<D>,
{
    let traverse = |position: usize, emit: &mut dyn FnMut(C::Output)| {
        let predicate = &ordered[position];
        pipeline.visit(tree, position, &mut |hit| callback.on_hit(predicate, hit, &mut *emit));
    };
    buffer::execute(plan, slots, &traverse)
}

/// Kind-specific geometry of a batch, in either caller or traversal order.
enum Pipeline {
    Spatial {
        regions: Vec<Region>,
    },
    Nearest {
        targets: Vec<(Point, usize)>,
        /// `min(k, tree size)` per caller slot.
        capacities: Vec<usize>,
        algorithm: NearestAlgorithm,
    },
}

impl Pipeline {
    fn spatial<D>(batch: &[Predicate<D>]) -> Result<Self, QueryError> {
        let regions = batch
            .iter()
            .enumerate()
            .map(|(index, p)| match p {
                Predicate::Spatial(q) => Ok(q.region),
                Predicate::Nearest(_) => Err(QueryError::MixedPredicateKinds {
                    index,
                    expected: PredicateKind::Spatial,
                    found: PredicateKind::Nearest,
                }),
            })
            .collect::<Result<_, _>>()?;
        Ok(Self::Spatial { regions })
    }

    fn nearest<D>(
        batch: &[Predicate<D>],
        tree_size: usize,
        algorithm: NearestAlgorithm,
    ) -> Result<Self, QueryError> {
        let targets: Vec<(Point, usize)> = batch
            .iter()
            .enumerate()
            .map(|(index, p)| match p {
                Predicate::Nearest(q) => usize::try_from(q.k)
                    .map(|k| (q.point, k.min(tree_size)))
                    .map_err(|_| QueryError::NegativeK {
                        predicate: index,
                        k: q.k,
                    }),
                Predicate::Spatial(_) => Err(QueryError::MixedPredicateKinds {
                    index,
                    expected: PredicateKind::Nearest,
                    found: PredicateKind::Spatial,
                }),
            })
            .collect::<Result<_, _>>()?;
        let capacities = targets.iter().map(|&(_, k)| k).collect();
        Ok(Self::Nearest {
            targets,
            capacities,
            algorithm,
        })
    }

    /// Reorder the geometry into traversal order. Capacities stay keyed by caller slot.
    fn permuted(self, order: &Permutation) -> Self {
        match self {
            Self::Spatial { regions } => Self::Spatial {
                regions: order.apply(&regions),
            },
            Self::Nearest {
                targets,
                capacities,
                algorithm,
            } => Self::Nearest {
                targets: order.apply(&targets),
                capacities,
                algorithm,
            },
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Spatial { regions } => regions.len(),
            Self::Nearest { targets, .. } => targets.len(),
        }
    }

    fn plan(&self, buffer: BufferPolicy) -> Result<Plan, QueryError> {
        match self {
            // Every nearest predicate knows its result count up front.
            Self::Nearest { capacities, .. } => Ok(Plan::Speculative {
                capacities: capacities.clone(),
                on_overflow: OnOverflow::Fail,
            }),
            Self::Spatial { .. } => match buffer {
                BufferPolicy::Exact => Ok(Plan::Exact),
                BufferPolicy::Speculative {
                    capacity,
                    on_overflow,
                } => {
                    let predicates = self.len();
                    if predicates.checked_mul(capacity).is_none() {
                        return Err(QueryError::BufferTooLarge {
                            predicates,
                            capacity,
                        });
                    }
                    Ok(Plan::Speculative {
                        capacities: vec![capacity; predicates],
                        on_overflow,
                    })
                }
            },
        }
    }

    fn visit<T: Traverse>(&self, tree: &T, position: usize, on_hit: &mut dyn FnMut(Hit)) {
        match self {
            Self::Spatial { regions } => tree.intersecting(&regions[position], &mut |primitive| {
                on_hit(Hit {
                    primitive,
                    distance: None,
                });
            }),
            Self::Nearest {
                targets, algorithm, ..
            } => {
                let (point, k) = targets[position];
                tree.nearest(point, k, *algorithm, &mut |primitive, distance| {
                    on_hit(Hit {
                        primitive,
                        distance: Some(distance),
                    });
                });
            }
        }
    }
}

/// Logs a plan without dumping per-predicate capacities.
struct PlanSummary<'a>(&'a Plan);

impl core::fmt::Debug for PlanSummary<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            Plan::Exact => f.write_str("Exact"),
            Plan::Speculative {
                capacities,
                on_overflow,
            } => f
                .debug_struct("Speculative")
                .field("reserved", &capacities.iter().sum::<usize>())
                .field("on_overflow", on_overflow)
                .finish(),
        }
    }
}
