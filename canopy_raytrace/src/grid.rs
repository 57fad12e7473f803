// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The uniform cell grid rays travel through.

use core::ops::Range;

use canopy_index::{Aabb, Ray};
use kurbo::Point;

use crate::error::RaytraceError;

/// `nx` by `ny` equal cells covering `[0, lx] x [0, ly]`.
///
/// Cell `(i, j)` has id `i + nx * j`, so ids run along rows.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CellGrid {
    nx: usize,
    ny: usize,
    lx: f64,
    ly: f64,
}

impl CellGrid {
    /// A grid with the given cell counts and side lengths.
    pub fn new(nx: usize, ny: usize, lx: f64, ly: f64) -> Result<Self, RaytraceError> {
        if nx == 0 || ny == 0 {
            return Err(RaytraceError::InvalidGrid("cell counts must be positive"));
        }
        if !(lx.is_finite() && ly.is_finite() && lx > 0.0 && ly > 0.0) {
            return Err(RaytraceError::InvalidGrid(
                "side lengths must be positive and finite",
            ));
        }
        Ok(Self { nx, ny, lx, ly })
    }

    /// Cells along x.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Cells along y.
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny
    }

    /// Width and height of one cell.
    #[allow(
        clippy::cast_precision_loss,
        reason = "cell counts are far below 2^52"
    )]
    pub fn cell_size(&self) -> (f64, f64) {
        (self.lx / self.nx as f64, self.ly / self.ny as f64)
    }

    /// Area of one cell.
    pub fn cell_area(&self) -> f64 {
        let (dx, dy) = self.cell_size();
        dx * dy
    }

    /// Id of cell `(i, j)`.
    pub fn cell_id(&self, i: usize, j: usize) -> usize {
        i + self.nx * j
    }

    /// `(i, j)` of a cell id.
    pub fn cell_coords(&self, id: usize) -> (usize, usize) {
        (id % self.nx, id / self.nx)
    }

    /// Box of a cell.
    #[allow(
        clippy::cast_precision_loss,
        reason = "cell indices are far below 2^52"
    )]
    pub fn cell_box(&self, id: usize) -> Aabb {
        let (i, j) = self.cell_coords(id);
        let (dx, dy) = self.cell_size();
        Aabb::from_xywh(i as f64 * dx, j as f64 * dy, dx, dy)
    }

    /// Every cell box, indexed by id.
    pub fn boxes(&self) -> Vec<Aabb> {
        (0..self.cell_count()).map(|id| self.cell_box(id)).collect()
    }

    /// The whole domain.
    pub fn bounds(&self) -> Aabb {
        Aabb::new(0.0, 0.0, self.lx, self.ly)
    }

    /// Cell ids owned by partition `rank` of `ranks` when the grid is cut into
    /// horizontal strips of whole rows.
    ///
    /// Strips are convex, so a straight ray crosses each at most once.
    pub fn row_strip(&self, rank: usize, ranks: usize) -> Result<Range<usize>, RaytraceError> {
        if ranks == 0 || ranks > self.ny || rank >= ranks {
            return Err(RaytraceError::InvalidPartitioning {
                rows: self.ny,
                ranks,
            });
        }
        let first_row = rank * self.ny / ranks;
        let last_row = (rank + 1) * self.ny / ranks;
        Ok(first_row * self.nx..last_row * self.nx)
    }

    /// `rays_per_cell` rays per cell, with origins uniform inside the cell and
    /// directions uniform on the circle.
    ///
    /// Rays are grouped by cell: ray `r` starts in cell `r / rays_per_cell`. The same
    /// seed always yields the same rays.
    pub fn sample_rays(&self, rays_per_cell: usize, seed: u64) -> Vec<Ray> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut rays = Vec::with_capacity(self.cell_count() * rays_per_cell);
        for id in 0..self.cell_count() {
            let cell = self.cell_box(id);
            for _ in 0..rays_per_cell {
                let origin = Point::new(
                    cell.min_x + rng.f64() * cell.width(),
                    cell.min_y + rng.f64() * cell.height(),
                );
                let angle = rng.f64() * core::f64::consts::TAU;
                rays.push(Ray::from_angle(origin, angle));
            }
        }
        rays
    }
}
