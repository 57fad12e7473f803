// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Z-order (Morton) reordering of predicate batches.
//!
//! Predicates whose reference points are close on the curve tend to visit the same
//! subtrees, so traversing them next to each other improves locality. Reordering is a
//! pure performance hint: results are always assembled back in caller order.

use canopy_index::Aabb;
use kurbo::Point;
use rayon::prelude::*;

use crate::permutation::Permutation;
use crate::predicate::Predicate;

/// Spread the 32 bits of `v` over the even bits of a `u64`.
fn expand_bits(v: u32) -> u64 {
    let mut x = u64::from(v);
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "t is clamped to [0, 1] so the scaled value fits in a u32"
)]
fn quantize(v: f64, lo: f64, hi: f64) -> u32 {
    let extent = hi - lo;
    if extent <= 0.0 {
        return 0;
    }
    let t = ((v - lo) / extent).clamp(0.0, 1.0);
    (t * f64::from(u32::MAX)) as u32
}

/// Morton code of `p`, normalized to `bounds`; points outside are clamped to the edge.
pub fn morton_code(p: Point, bounds: &Aabb) -> u64 {
    let x = quantize(p.x, bounds.min_x, bounds.max_x);
    let y = quantize(p.y, bounds.min_y, bounds.max_y);
    expand_bits(x) | (expand_bits(y) << 1)
}

/// Traversal order for `predicates` along the Z-order curve over `bounds`.
///
/// Equal codes keep their relative caller order, so the result is deterministic.
pub fn z_order<D: Sync>(bounds: &Aabb, predicates: &[Predicate<D>]) -> Permutation {
    let codes: Vec<u64> = predicates
        .par_iter()
        .map(|p| morton_code(p.reference_point(), bounds))
        .collect();
    let mut order: Vec<usize> = (0..predicates.len()).collect();
    order.par_sort_unstable_by_key(|&i| (codes[i], i));
    Permutation::from_bijection(order)
}
