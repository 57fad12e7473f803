// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types and helpers.

use core::cmp::Ordering;

use kurbo::{Point, Rect};

/// Axis-aligned bounding box in 2D.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum x (left)
    pub min_x: f64,
    /// Minimum y (top)
    pub min_y: f64,
    /// Maximum x (right)
    pub max_x: f64,
    /// Maximum y (bottom)
    pub max_y: f64,
}

impl Aabb {
    /// Create a new AABB from min/max corners.
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create an AABB from origin and size.
    pub const fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x + w,
            max_y: y + h,
        }
    }

    /// Convert a Kurbo rectangle, normalizing its corners.
    pub fn from_rect(rect: Rect) -> Self {
        let r = rect.abs();
        Self::new(r.x0, r.y0, r.x1, r.y1)
    }

    /// Convert back to a Kurbo rectangle.
    pub fn to_rect(&self) -> Rect {
        Rect::new(self.min_x, self.min_y, self.max_x, self.max_y)
    }

    /// Degenerate box covering a single point.
    pub fn from_point(p: Point) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    /// Whether this AABB contains the point. Boundaries are inclusive.
    pub fn contains_point(&self, p: Point) -> bool {
        le(self.min_x, p.x) && le(self.min_y, p.y) && le(p.x, self.max_x) && le(p.y, self.max_y)
    }

    /// The intersection of two AABBs. May be empty; check with [`Aabb::is_empty`].
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            min_x: max_f(self.min_x, other.min_x),
            min_y: max_f(self.min_y, other.min_y),
            max_x: min_f(self.max_x, other.max_x),
            max_y: min_f(self.max_y, other.max_y),
        }
    }

    /// Whether the two boxes overlap or touch.
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Return true if the AABB is inverted (no extent). Assumes no NaN.
    ///
    /// A zero-width box is not empty; it still covers a segment or a point.
    pub fn is_empty(&self) -> bool {
        lt(self.max_x, self.min_x) || lt(self.max_y, self.min_y)
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: min_f(self.min_x, other.min_x),
            min_y: min_f(self.min_y, other.min_y),
            max_x: max_f(self.max_x, other.max_x),
            max_y: max_f(self.max_y, other.max_y),
        }
    }

    /// Center of the box.
    pub fn center(&self) -> Point {
        Point::new(0.5 * (self.min_x + self.max_x), 0.5 * (self.min_y + self.max_y))
    }

    /// Width of the box, zero when inverted.
    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).max(0.0)
    }

    /// Height of the box, zero when inverted.
    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).max(0.0)
    }

    /// Area of the box, zero when inverted.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// The point of the box nearest to `p` (which is `p` itself when inside).
    pub fn closest_point(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.min_x, self.max_x),
            p.y.clamp(self.min_y, self.max_y),
        )
    }

    /// Euclidean distance from `p` to the box; zero when inside.
    pub fn distance_to_point(&self, p: Point) -> f64 {
        p.distance(self.closest_point(p))
    }

    /// Squared distance from `p` to the box; zero when inside.
    ///
    /// Monotone in [`Aabb::distance_to_point`] and free of square roots, so it is
    /// what the traversals compare against.
    pub fn distance_sq_to_point(&self, p: Point) -> f64 {
        p.distance_squared(self.closest_point(p))
    }
}

impl From<Rect> for Aabb {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}

/// Union of a sequence of boxes. Returns `None` for an empty sequence.
pub fn union_all<I: IntoIterator<Item = Aabb>>(boxes: I) -> Option<Aabb> {
    let mut it = boxes.into_iter();
    let first = it.next()?;
    Some(it.fold(first, |acc, b| acc.union(&b)))
}

pub(crate) fn min_f(a: f64, b: f64) -> f64 {
    match a.partial_cmp(&b) {
        Some(Ordering::Greater) => b,
        _ => a,
    }
}

pub(crate) fn max_f(a: f64, b: f64) -> f64 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => b,
        _ => a,
    }
}

pub(crate) fn le(a: f64, b: f64) -> bool {
    a.partial_cmp(&b)
        .map(|o| o != Ordering::Greater)
        .unwrap_or(false)
}

pub(crate) fn lt(a: f64, b: f64) -> bool {
    a.partial_cmp(&b)
        .map(|o| o == Ordering::Less)
        .unwrap_or(false)
}
