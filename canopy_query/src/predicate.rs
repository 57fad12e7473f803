// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Predicates: what a query asks of the tree, plus the caller's payload.

use core::fmt;

use canopy_index::Region;
use kurbo::Point;

/// A region test with attached payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Intersects<D> {
    /// Geometry primitives must meet.
    pub region: Region,
    /// Caller payload, carried through reordering unchanged.
    pub data: D,
}

/// A k-nearest search with attached payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Nearest<D> {
    /// Query point.
    pub point: Point,
    /// Number of neighbours requested. Negative values are rejected before traversal.
    pub k: i32,
    /// Caller payload, carried through reordering unchanged.
    pub data: D,
}

/// One query of a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate<D = ()> {
    /// Every primitive meeting a region.
    Spatial(Intersects<D>),
    /// The `k` primitives nearest to a point.
    Nearest(Nearest<D>),
}

/// Kind of a [`Predicate`], used to pick the execution pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    /// See [`Predicate::Spatial`].
    Spatial,
    /// See [`Predicate::Nearest`].
    Nearest,
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spatial => "spatial",
            Self::Nearest => "nearest",
        })
    }
}

impl<D> Predicate<D> {
    /// A spatial predicate.
    pub fn intersects(region: impl Into<Region>, data: D) -> Self {
        Self::Spatial(Intersects {
            region: region.into(),
            data,
        })
    }

    /// A nearest predicate.
    pub fn nearest(point: impl Into<Point>, k: i32, data: D) -> Self {
        Self::Nearest(Nearest {
            point: point.into(),
            k,
            data,
        })
    }

    /// Which pipeline runs this predicate.
    pub fn kind(&self) -> PredicateKind {
        match self {
            Self::Spatial(_) => PredicateKind::Spatial,
            Self::Nearest(_) => PredicateKind::Nearest,
        }
    }

    /// The attached payload.
    pub fn data(&self) -> &D {
        match self {
            Self::Spatial(q) => &q.data,
            Self::Nearest(q) => &q.data,
        }
    }

    /// The region of a spatial predicate.
    pub fn region(&self) -> Option<&Region> {
        match self {
            Self::Spatial(q) => Some(&q.region),
            Self::Nearest(_) => None,
        }
    }

    /// The point used to place this predicate on a space-filling curve.
    pub fn reference_point(&self) -> Point {
        match self {
            Self::Spatial(q) => q.region.reference_point(),
            Self::Nearest(q) => q.point,
        }
    }

    /// Replace the payload, keeping the geometry.
    pub fn attach<E>(self, data: E) -> Predicate<E> {
        match self {
            Self::Spatial(q) => Predicate::Spatial(Intersects {
                region: q.region,
                data,
            }),
            Self::Nearest(q) => Predicate::Nearest(Nearest {
                point: q.point,
                k: q.k,
                data,
            }),
        }
    }
}

/// Random-access, side-effect-free source of predicates.
///
/// Implemented for vectors, arrays and slice references of [`Predicate`]; implement it
/// directly to build predicates on the fly from other storage.
pub trait PredicateSource<D>: Sync {
    /// Number of predicates in the batch.
    fn size(&self) -> usize;

    /// Predicate `i`, for `i < size()`.
    fn get(&self, i: usize) -> Predicate<D>;
}

impl<D: Clone + Sync> PredicateSource<D> for Vec<Predicate<D>> {
    fn size(&self) -> usize {
        self.len()
    }

    fn get(&self, i: usize) -> Predicate<D> {
        self[i].clone()
    }
}

impl<D: Clone + Sync> PredicateSource<D> for &[Predicate<D>] {
    fn size(&self) -> usize {
        self.len()
    }

    fn get(&self, i: usize) -> Predicate<D> {
        self[i].clone()
    }
}

impl<D: Clone + Sync, const N: usize> PredicateSource<D> for [Predicate<D>; N] {
    fn size(&self) -> usize {
        N
    }

    fn get(&self, i: usize) -> Predicate<D> {
        self[i].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_index::Aabb;

    #[test]
    fn attach_keeps_geometry() {
        let p = Predicate::nearest((1.0, 2.0), 3, "a").attach(7_u32);
        assert_eq!(p, Predicate::nearest((1.0, 2.0), 3, 7_u32));
        assert_eq!(*p.data(), 7);
        assert_eq!(p.kind(), PredicateKind::Nearest);
        assert!(p.region().is_none());
    }

    #[test]
    fn reference_point_of_a_rect_is_its_center() {
        let p = Predicate::intersects(Aabb::new(0.0, 0.0, 2.0, 4.0), ());
        assert_eq!(p.reference_point(), Point::new(1.0, 2.0));
        assert_eq!(p.kind().to_string(), "spatial");
    }

    #[test]
    fn slices_are_sources() {
        let v = vec![
            Predicate::nearest((0.0, 0.0), 1, 0_usize),
            Predicate::nearest((1.0, 0.0), 1, 1_usize),
        ];
        let s: &[Predicate<usize>] = &v;
        assert_eq!(PredicateSource::size(&s), 2);
        assert_eq!(*PredicateSource::get(&s, 1).data(), 1);
    }
}
