// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Raytrace: radiative absorption in a 2D cell grid, traced with `canopy_query`.
//!
//! Rays start inside the cells of a [`CellGrid`] and travel through an absorbing
//! [`Medium`]. Every cell a ray crosses emits according to an [`Emission`] and
//! attenuates everything behind it, so the crossings are walked in order of entry
//! distance ([`accumulate`]). The gathered intensity is deposited back into the cell
//! the ray started from.
//!
//! Two drivers are provided:
//!
//! - [`absorbed_energy`] traces every ray through one tree over the whole grid, using
//!   [`OrderedAccumulation`] as a post-processing callback.
//! - [`absorbed_energy_distributed`] splits the grid into row strips, one per rank.
//!   Each strip reduces a ray's crossings to an [`AggregatedRecord`], the records are
//!   [`compose`]d on the ray's own rank, and a [`Reduce`] sums the per-rank energies.
//!
//! # Example
//!
//! ```rust
//! use canopy_query::TraversalPolicy;
//! use canopy_raytrace::{Blackbody, CellGrid, Medium, absorbed_energy, absorbed_energy_distributed};
//!
//! let grid = CellGrid::new(4, 4, 1.0, 1.0).unwrap();
//! let rays = grid.sample_rays(8, 1);
//! let medium = Medium::new(2.0);
//! let policy = TraversalPolicy::default();
//!
//! let single = absorbed_energy(&grid, &rays, 8, &medium, &Blackbody::default(), &policy).unwrap();
//! let split =
//!     absorbed_energy_distributed(&grid, &rays, 8, 2, &medium, Blackbody::default(), &policy)
//!         .unwrap();
//! for (a, b) in single.iter().zip(&split) {
//!     assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0));
//! }
//! ```

mod accumulate;
mod distributed;
mod error;
mod grid;
mod intersect;
mod medium;

pub use accumulate::{
    AggregatedRecord, OrderedAccumulation, Segment, absorbed_energy, accumulate, compose, deposit,
};
pub use distributed::{
    DistributedTree, LocalCommunicator, LocalDistributedTree, Reduce, absorbed_energy_distributed,
    absorbed_energy_on_rank,
};
pub use error::RaytraceError;
pub use grid::CellGrid;
pub use intersect::{
    ForwardDeposit, IntersectedCell, RayCellIntersections, Rays, aggregate_intersections,
    forward_deposit, sort_intersections,
};
pub use medium::{Blackbody, Emission, Medium};
