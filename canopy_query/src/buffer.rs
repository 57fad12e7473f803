// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Result buffering: turn a per-position traversal into a [`Csr`] in caller order.
//!
//! The engine never looks at geometry. It is handed a `traverse(position, emit)`
//! function that calls `emit` once per result of the predicate at a traversal
//! position, and a [`SlotMap`] saying which caller slot each position fills.
//!
//! Each predicate writes into its own disjoint region of the output, so positions run
//! in parallel without synchronization. Traversal must be deterministic: running a
//! position twice must emit the same values in the same order.

use rayon::prelude::*;

use crate::csr::{Csr, exclusive_prefix_sum};
use crate::error::{Overflow, QueryError};
use crate::permutation::SlotMap;
use crate::policy::OnOverflow;

/// A resolved buffering plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Count, allocate, write.
    Exact,
    /// One write pass into fixed per-slot reservations.
    Speculative {
        /// Reserved slots, indexed by caller slot.
        capacities: Vec<usize>,
        on_overflow: OnOverflow,
    },
}

/// A predicate's window into the shared output.
struct Lane<'a, T> {
    position: usize,
    slot: usize,
    cells: &'a mut [T],
}

/// Split `buf` into one lane per slot, sized by `offsets`, then sort lanes by
/// traversal position.
fn split_lanes<'a, T, M: SlotMap + ?Sized>(
    buf: &'a mut [T],
    offsets: &[usize],
    slots: &M,
) -> Vec<Lane<'a, T>> {
    let mut out = Vec::with_capacity(offsets.len().saturating_sub(1));
    let mut rest = buf;
    for (slot, w) in offsets.windows(2).enumerate() {
        let (cells, tail) = core::mem::take(&mut rest).split_at_mut(w[1] - w[0]);
        out.push(Lane {
            position: slots.position(slot),
            slot,
            cells,
        });
        rest = tail;
    }
    out.sort_unstable_by_key(|l| l.position);
    out
}

/// Run `traverse` for every position and assemble results per `plan`.
pub(crate) fn execute<V, M, F>(plan: Plan, slots: &M, traverse: &F) -> Result<Csr<V>, QueryError>
where
    V: Send,
    M: SlotMap + ?Sized,
    F: Fn(usize, &mut dyn FnMut(V)) + Sync,
{
    match plan {
        Plan::Exact => exact(slots, traverse),
        Plan::Speculative {
            capacities,
            on_overflow,
        } => match speculative(slots, &capacities, traverse) {
            Err(QueryError::BufferOverflow { overflows }) if on_overflow == OnOverflow::Recount => {
                log::warn!(
                    "{} of {} predicates overflowed their reservation, recounting",
                    overflows.len(),
                    slots.len()
                );
                exact(slots, traverse)
            }
            outcome => outcome,
        },
    }
}

/// Count results per caller slot.
fn count<V, M, F>(slots: &M, traverse: &F) -> Vec<usize>
where
    M: SlotMap + ?Sized,
    F: Fn(usize, &mut dyn FnMut(V)) + Sync,
{
    let by_position: Vec<usize> = (0..slots.len())
        .into_par_iter()
        .map(|position| {
            let mut n = 0;
            traverse(position, &mut |_| n += 1);
            n
        })
        .collect();
    let mut counts = vec![0; slots.len()];
    for (position, n) in by_position.into_iter().enumerate() {
        counts[slots.slot(position)] = n;
    }
    counts
}

fn exact<V, M, F>(slots: &M, traverse: &F) -> Result<Csr<V>, QueryError>
where
    V: Send,
    M: SlotMap + ?Sized,
    F: Fn(usize, &mut dyn FnMut(V)) + Sync,
{
    let offsets = exclusive_prefix_sum(&count::<V, M, F>(slots, traverse));
    let total = offsets[offsets.len() - 1];
    log::trace!("exact buffering: {total} results for {} predicates", slots.len());

    let mut cells: Vec<Option<V>> = Vec::with_capacity(total);
    cells.resize_with(total, || None);
    let mismatch = {
        let mut lanes = split_lanes(&mut cells, &offsets, slots);
        lanes
            .par_iter_mut()
            .filter_map(|lane| {
                let mut found = 0;
                traverse(lane.position, &mut |v| {
                    if let Some(cell) = lane.cells.get_mut(found) {
                        *cell = Some(v);
                    }
                    found += 1;
                });
                (found != lane.cells.len()).then_some((lane.slot, lane.cells.len(), found))
            })
            .min_by_key(|&(slot, _, _)| slot)
    };
    if let Some((predicate, expected, found)) = mismatch {
        return Err(QueryError::InconsistentTraversal {
            predicate,
            expected,
            found,
        });
    }
    let values: Vec<V> = cells.into_iter().flatten().collect();
    Ok(Csr::from_raw(offsets, values))
}

/// One pass into `capacities`; on overflow, every overflowing slot in ascending order.
///
/// A reservation the allocator refuses is [`QueryError::BufferTooLarge`].
fn speculative<V, M, F>(
    slots: &M,
    capacities: &[usize],
    traverse: &F,
) -> Result<Csr<V>, QueryError>
where
    V: Send,
    M: SlotMap + ?Sized,
    F: Fn(usize, &mut dyn FnMut(V)) + Sync,
{
    debug_assert_eq!(capacities.len(), slots.len());
    let reserved = exclusive_prefix_sum(capacities);
    let total = reserved[reserved.len() - 1];
    log::trace!("speculative buffering: {total} slots for {} predicates", slots.len());

    let mut cells: Vec<Option<V>> = Vec::new();
    if cells.try_reserve_exact(total).is_err() {
        return Err(QueryError::BufferTooLarge {
            predicates: slots.len(),
            capacity: capacities.iter().copied().max().unwrap_or(0),
        });
    }
    cells.resize_with(total, || None);
    let found: Vec<(usize, usize)> = {
        let mut lanes = split_lanes(&mut cells, &reserved, slots);
        lanes
            .par_iter_mut()
            .map(|lane| {
                let mut n = 0;
                traverse(lane.position, &mut |v| {
                    if let Some(cell) = lane.cells.get_mut(n) {
                        *cell = Some(v);
                    }
                    n += 1;
                });
                (lane.slot, n)
            })
            .collect()
    };

    let mut counts = vec![0; slots.len()];
    for (slot, n) in found {
        counts[slot] = n;
    }
    let overflows: Vec<Overflow> = counts
        .iter()
        .zip(capacities)
        .enumerate()
        .filter(|&(_, (n, cap))| n > cap)
        .map(|(predicate, (&found, &reserved))| Overflow {
            predicate,
            reserved,
            found,
        })
        .collect();
    if !overflows.is_empty() {
        return Err(QueryError::BufferOverflow { overflows });
    }

    // Filled cells are a prefix of every lane, so dropping the empties compacts in order.
    let values: Vec<V> = cells.into_iter().flatten().collect();
    Ok(Csr::from_raw(exclusive_prefix_sum(&counts), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permutation::{Identity, Permutation};

    /// Position `p` of slot `s` emits `s` copies of `10 * s + i`.
    fn fan_out<M: SlotMap>(slots: &M) -> impl Fn(usize, &mut dyn FnMut(usize)) + Sync + '_ {
        move |position: usize, emit: &mut dyn FnMut(usize)| {
            let s = slots.slot(position);
            for i in 0..s {
                emit(10 * s + i);
            }
        }
    }

    fn expected(n: usize) -> Csr<usize> {
        (0..n).map(|s| (0..s).map(|i| 10 * s + i).collect()).collect()
    }

    #[test]
    fn exact_assembles_in_slot_order() {
        let perm = Permutation::from_vec(vec![3, 1, 0, 2]).unwrap();
        let csr = execute(Plan::Exact, &perm, &fan_out(&perm)).unwrap();
        assert_eq!(csr, expected(4));
    }

    #[test]
    fn speculative_that_fits_matches_exact() {
        let id = Identity(5);
        let plan = Plan::Speculative {
            capacities: vec![8; 5],
            on_overflow: OnOverflow::Fail,
        };
        assert_eq!(execute(plan, &id, &fan_out(&id)).unwrap(), expected(5));
    }

    #[test]
    fn overflow_recounts_or_fails() {
        let perm = Permutation::from_vec(vec![4, 2, 0, 3, 1]).unwrap();
        let recount = Plan::Speculative {
            capacities: vec![2; 5],
            on_overflow: OnOverflow::Recount,
        };
        assert_eq!(execute(recount, &perm, &fan_out(&perm)).unwrap(), expected(5));

        let fail = Plan::Speculative {
            capacities: vec![2; 5],
            on_overflow: OnOverflow::Fail,
        };
        let err = execute(fail, &perm, &fan_out(&perm)).unwrap_err();
        assert_eq!(err.overflowing_predicates(), Some(vec![3, 4]));
    }

    #[test]
    fn nondeterministic_traversal_is_reported() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = AtomicUsize::new(0);
        let flaky = |_position: usize, emit: &mut dyn FnMut(u8)| {
            // First visit emits one value, the second emits two.
            for _ in 0..=calls.fetch_add(1, Ordering::Relaxed) {
                emit(0);
            }
        };
        let err = execute(Plan::Exact, &Identity(1), &flaky).unwrap_err();
        assert_eq!(
            err,
            QueryError::InconsistentTraversal {
                predicate: 0,
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn unallocatable_reservation_is_an_error() {
        let id = Identity(64);
        let plan = Plan::Speculative {
            capacities: vec![1 << 40; 64],
            on_overflow: OnOverflow::Recount,
        };
        let err = execute(plan, &id, &fan_out(&id)).unwrap_err();
        assert_eq!(
            err,
            QueryError::BufferTooLarge {
                predicates: 64,
                capacity: 1 << 40
            }
        );
    }

    #[test]
    fn nothing_to_do() {
        let csr: Csr<u8> = execute(Plan::Exact, &Identity(0), &|_, _: &mut dyn FnMut(u8)| {}).unwrap();
        assert_eq!(csr.offsets(), &[0]);
    }
}
