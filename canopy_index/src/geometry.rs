// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Query geometry: rays and the closed set of regions a spatial query can test.

use kurbo::{Circle, Point, Vec2};

use crate::types::{Aabb, max_f, min_f};

/// A half-line starting at `origin` and extending along `direction`.
///
/// The direction is normalized on construction, so distances along the ray are
/// Euclidean distances from the origin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ray {
    /// Start of the ray.
    pub origin: Point,
    /// Unit direction.
    pub direction: Vec2,
}

/// Portion of a ray inside a box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Overlap {
    /// Distance from the ray origin to the point where the ray enters the box.
    /// Zero when the origin lies inside the box.
    pub entry: f64,
    /// Length of the ray segment inside the box.
    pub length: f64,
}

impl Overlap {
    /// Distance at which the ray leaves the box.
    pub fn exit(&self) -> f64 {
        self.entry + self.length
    }
}

impl Ray {
    /// Create a ray. `direction` is normalized.
    ///
    /// # Panics
    ///
    /// Panics if `direction` is the zero vector, which has no direction to normalize.
    pub fn new(origin: Point, direction: Vec2) -> Self {
        assert!(
            direction.x != 0.0 || direction.y != 0.0,
            "ray direction must be non-zero"
        );
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Create a ray from an origin and an angle in radians (counter-clockwise from +x).
    pub fn from_angle(origin: Point, angle: f64) -> Self {
        Self {
            origin,
            direction: Vec2::from_angle(angle),
        }
    }

    /// Point at distance `t` along the ray.
    pub fn at(&self, t: f64) -> Point {
        self.origin + self.direction * t
    }

    /// Entry distance and length of the ray inside `aabb`, if they meet.
    ///
    /// Uses the slab method. Touching a corner or an edge yields a zero-length overlap.
    pub fn overlap(&self, aabb: &Aabb) -> Option<Overlap> {
        let (x0, x1) = slab(self.origin.x, self.direction.x, aabb.min_x, aabb.max_x)?;
        let (y0, y1) = slab(self.origin.y, self.direction.y, aabb.min_y, aabb.max_y)?;
        let near = max_f(max_f(x0, y0), 0.0);
        let far = min_f(x1, y1);
        if far < near {
            return None;
        }
        Some(Overlap {
            entry: near,
            length: far - near,
        })
    }
}

/// Parameter interval where `origin + t * dir` lies within `[lo, hi]` along one axis.
fn slab(origin: f64, dir: f64, lo: f64, hi: f64) -> Option<(f64, f64)> {
    if dir == 0.0 {
        if origin < lo || origin > hi {
            return None;
        }
        return Some((f64::NEG_INFINITY, f64::INFINITY));
    }
    let inv = 1.0 / dir;
    let t0 = (lo - origin) * inv;
    let t1 = (hi - origin) * inv;
    Some((min_f(t0, t1), max_f(t0, t1)))
}

/// Geometry of a spatial query.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Region {
    /// Boxes containing the point.
    Point(Point),
    /// Boxes overlapping the rectangle.
    Rect(Aabb),
    /// Boxes within `radius` of the center.
    Circle(Circle),
    /// Boxes crossed by the ray.
    Ray(Ray),
}

impl Region {
    /// Whether a primitive (or node) bounding box satisfies this region.
    pub fn intersects(&self, aabb: &Aabb) -> bool {
        match self {
            Self::Point(p) => aabb.contains_point(*p),
            Self::Rect(r) => aabb.overlaps(r),
            Self::Circle(c) => aabb.distance_sq_to_point(c.center) <= c.radius * c.radius,
            Self::Ray(ray) => ray.overlap(aabb).is_some(),
        }
    }

    /// A representative point used to order queries spatially.
    pub fn reference_point(&self) -> Point {
        match self {
            Self::Point(p) => *p,
            Self::Rect(r) => r.center(),
            Self::Circle(c) => c.center,
            Self::Ray(ray) => ray.origin,
        }
    }
}

impl From<Aabb> for Region {
    fn from(aabb: Aabb) -> Self {
        Self::Rect(aabb)
    }
}

impl From<Ray> for Region {
    fn from(ray: Ray) -> Self {
        Self::Ray(ray)
    }
}

impl From<Circle> for Region {
    fn from(circle: Circle) -> Self {
        Self::Circle(circle)
    }
}

impl From<Point> for Region {
    fn from(p: Point) -> Self {
        Self::Point(p)
    }
}
