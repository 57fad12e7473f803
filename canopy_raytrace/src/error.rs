// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use canopy_query::QueryError;

/// Why a raytracing run failed.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RaytraceError {
    /// The underlying query call failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Grid dimensions are unusable.
    #[error("invalid grid: {0}")]
    InvalidGrid(&'static str),

    /// The grid cannot be split into the requested partitions.
    #[error("cannot split {rows} rows into {ranks} partitions")]
    InvalidPartitioning {
        /// Rows in the grid.
        rows: usize,
        /// Requested partitions.
        ranks: usize,
    },

    /// A cross-partition reduction failed.
    #[error("reduction failed on rank {rank}: {reason}")]
    Reduction {
        /// Rank that observed the failure.
        rank: usize,
        /// What went wrong.
        reason: String,
    },
}
