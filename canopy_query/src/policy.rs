// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Caller-facing knobs for a query call.

use canopy_index::NearestAlgorithm;

/// How a query call traverses and buffers.
///
/// `buffer_size` selects the buffering strategy for spatial predicates:
///
/// - `0`: count every predicate's results first, then allocate exactly and write.
/// - `n > 0`: reserve `n` results per predicate and write in one pass; if any predicate
///   produces more, discard the pass and fall back to counting.
/// - `n < 0`: reserve `|n|` results per predicate and fail with
///   [`QueryError::BufferOverflow`](crate::QueryError::BufferOverflow) on overflow.
///
/// Nearest predicates ignore `buffer_size`: each reserves `min(k, tree size)` slots,
/// which is exact.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraversalPolicy {
    /// Buffering strategy, see the type docs.
    pub buffer_size: i32,
    /// Traverse predicates in Z-order instead of caller order.
    pub sort_predicates: bool,
    /// Search strategy for nearest predicates.
    pub nearest_algorithm: NearestAlgorithm,
}

impl Default for TraversalPolicy {
    fn default() -> Self {
        Self {
            buffer_size: 0,
            sort_predicates: true,
            nearest_algorithm: NearestAlgorithm::StackBased,
        }
    }
}

impl TraversalPolicy {
    /// Set the buffering strategy.
    #[must_use]
    pub fn with_buffer_size(mut self, size: i32) -> Self {
        self.buffer_size = size;
        self
    }

    /// Enable or disable Z-order reordering.
    #[must_use]
    pub fn with_predicate_sorting(mut self, sort: bool) -> Self {
        self.sort_predicates = sort;
        self
    }

    /// Set the nearest search strategy.
    #[must_use]
    pub fn with_nearest_algorithm(mut self, algorithm: NearestAlgorithm) -> Self {
        self.nearest_algorithm = algorithm;
        self
    }

    /// The buffering strategy encoded by `buffer_size`.
    pub fn buffer(&self) -> BufferPolicy {
        BufferPolicy::from_signed(self.buffer_size)
    }
}

/// What to do when a speculative reservation turns out too small.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OnOverflow {
    /// Discard the pass and rerun with exact counts.
    Recount,
    /// Report the overflowing predicates.
    Fail,
}

/// Decoded form of [`TraversalPolicy::buffer_size`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Two passes: count, then write.
    Exact,
    /// One pass into a fixed reservation per predicate.
    Speculative {
        /// Slots per predicate.
        capacity: usize,
        /// Reaction to overflow.
        on_overflow: OnOverflow,
    },
}

impl BufferPolicy {
    /// Decode a signed buffer size.
    pub fn from_signed(size: i32) -> Self {
        let capacity = usize::try_from(size.unsigned_abs()).unwrap_or(usize::MAX);
        match size {
            0 => Self::Exact,
            s if s > 0 => Self::Speculative {
                capacity,
                on_overflow: OnOverflow::Recount,
            },
            _ => Self::Speculative {
                capacity,
                on_overflow: OnOverflow::Fail,
            },
        }
    }
}
