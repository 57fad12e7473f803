// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Physical parameters of the participating medium.

use core::f64::consts::PI;

/// A uniformly absorbing medium.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Medium {
    /// Absorption coefficient, per unit length.
    pub kappa: f64,
}

impl Default for Medium {
    fn default() -> Self {
        Self { kappa: 10.0 }
    }
}

impl Medium {
    /// A medium with absorption coefficient `kappa`.
    pub fn new(kappa: f64) -> Self {
        Self { kappa }
    }

    /// Optical depth of a geometric path of `length`.
    pub fn optical_path(&self, length: f64) -> f64 {
        self.kappa * length
    }

    /// Factor turning a ray's gathered intensity into absorbed power of its
    /// origin cell, for `rays_per_cell` rays per cell.
    #[allow(
        clippy::cast_precision_loss,
        reason = "ray counts are far below 2^52"
    )]
    pub fn deposit_factor(&self, rays_per_cell: usize) -> f64 {
        4.0 * PI * self.kappa / rays_per_cell as f64
    }

    /// Power emitted per unit volume by a medium at `emission`'s blackbody state.
    pub fn emitted_power(&self, emission: &Blackbody) -> f64 {
        4.0 * self.kappa * emission.sigma * emission.temperature.powi(4)
    }
}

/// Source weight of a cell, in intensity units.
pub trait Emission: Sync {
    /// Weight of the cell with the given global id.
    fn weight(&self, cell: usize) -> f64;
}

/// The same weight everywhere.
impl Emission for f64 {
    fn weight(&self, _: usize) -> f64 {
        *self
    }
}

/// A weight per cell, indexed by global id; missing cells weigh nothing.
impl Emission for [f64] {
    fn weight(&self, cell: usize) -> f64 {
        self.get(cell).copied().unwrap_or(0.0)
    }
}

impl Emission for Vec<f64> {
    fn weight(&self, cell: usize) -> f64 {
        self.as_slice().weight(cell)
    }
}

/// Blackbody emission at a uniform temperature: `sigma * T^4 / pi`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Blackbody {
    /// Temperature in Kelvin.
    pub temperature: f64,
    /// Stefan-Boltzmann constant.
    pub sigma: f64,
}

impl Blackbody {
    /// Stefan-Boltzmann constant in W m^-2 K^-4, to three digits.
    pub const SIGMA: f64 = 5.67e-8;

    /// A blackbody at `temperature`.
    pub fn new(temperature: f64) -> Self {
        Self {
            temperature,
            sigma: Self::SIGMA,
        }
    }

    /// Emitted intensity.
    pub fn intensity(&self) -> f64 {
        self.sigma * self.temperature.powi(4) / PI
    }
}

impl Default for Blackbody {
    fn default() -> Self {
        Self::new(2000.0)
    }
}

impl Emission for Blackbody {
    fn weight(&self, _: usize) -> f64 {
        self.intensity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let m = Medium::default();
        assert_eq!(m.kappa, 10.0);
        assert_eq!(m.optical_path(0.5), 5.0);
        let b = Blackbody::default();
        let expected = 5.67e-8 * 2000.0_f64.powi(4) / PI;
        assert!((b.intensity() - expected).abs() < 1e-9 * expected);
        assert_eq!(b.weight(42), b.intensity());
    }

    #[test]
    fn per_cell_weights() {
        let w: Vec<f64> = vec![1.0, 2.0];
        assert_eq!(w.weight(1), 2.0);
        assert_eq!(w.weight(5), 0.0);
        assert_eq!(3.5_f64.weight(9), 3.5);
    }

    #[test]
    fn deposit_and_emission() {
        let m = Medium::new(2.0);
        assert!((m.deposit_factor(4) - 2.0 * PI).abs() < 1e-12);
        let b = Blackbody {
            temperature: 1.0,
            sigma: 1.0,
        };
        assert_eq!(m.emitted_power(&b), 8.0);
    }
}
