// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by a query call.
//!
//! Configuration errors are detected before any traversal starts. Overflow and
//! consistency errors are reported once a pass has completed, never mid-flight, and
//! a failed call never hands back a partially populated result.

use crate::predicate::PredicateKind;

/// A predicate whose results did not fit its speculative reservation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Overflow {
    /// Index of the predicate in the caller's batch.
    pub predicate: usize,
    /// Slots reserved for it.
    pub reserved: usize,
    /// Results it actually produced.
    pub found: usize,
}

/// Why a query call failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// A nearest predicate asked for a negative number of neighbours.
    #[error("nearest predicate {predicate} asks for k = {k}; k must be non-negative")]
    NegativeK {
        /// Index of the predicate in the caller's batch.
        predicate: usize,
        /// The rejected value.
        k: i32,
    },

    /// The batch mixes spatial and nearest predicates.
    #[error("predicate {index} is a {found} predicate in a batch of {expected} predicates")]
    MixedPredicateKinds {
        /// First offending index in the caller's batch.
        index: usize,
        /// Kind of the batch (the kind of predicate 0).
        expected: PredicateKind,
        /// Kind found at `index`.
        found: PredicateKind,
    },

    /// The requested result assembly cannot handle this kind of predicate.
    #[error("`{callback}` cannot assemble results of {kind} predicates")]
    IncompatibleCallback {
        /// Name of the assembly that was requested.
        callback: &'static str,
        /// Kind of the batch.
        kind: PredicateKind,
    },

    /// Speculative buffering was asked to fail on overflow and some predicates overflowed.
    #[error(
        "{} predicate(s) overflowed the speculative buffer, first predicate {} ({} results for {} slots)",
        overflows.len(),
        overflows.first().map_or(0, |o| o.predicate),
        overflows.first().map_or(0, |o| o.found),
        overflows.first().map_or(0, |o| o.reserved)
    )]
    BufferOverflow {
        /// Every overflowing predicate, in ascending batch order.
        overflows: Vec<Overflow>,
    },

    /// The speculative reservation cannot be addressed.
    #[error("speculative buffer of {predicates} x {capacity} results is too large")]
    BufferTooLarge {
        /// Number of predicates.
        predicates: usize,
        /// Requested per-predicate capacity.
        capacity: usize,
    },

    /// The write pass disagreed with the counting pass.
    #[error("predicate {predicate} produced {found} results while writing but {expected} while counting")]
    InconsistentTraversal {
        /// Index of the predicate in the caller's batch.
        predicate: usize,
        /// Results counted in the first pass.
        expected: usize,
        /// Results produced in the second pass.
        found: usize,
    },

    /// Offsets handed to [`Csr::new`](crate::Csr::new) do not describe the values.
    #[error("malformed CSR: {reason}")]
    MalformedCsr {
        /// What is wrong with the offsets.
        reason: &'static str,
    },

    /// A permutation is not a bijection on `0..len`.
    #[error("not a permutation of 0..{len}: index {value} is out of range or repeated")]
    InvalidPermutation {
        /// Length of the candidate permutation.
        len: usize,
        /// First offending entry.
        value: usize,
    },
}

impl QueryError {
    /// Indices of the predicates responsible for an overflow error.
    pub fn overflowing_predicates(&self) -> Option<Vec<usize>> {
        match self {
            Self::BufferOverflow { overflows } => {
                Some(overflows.iter().map(|o| o.predicate).collect())
            }
            _ => None,
        }
    }
}
