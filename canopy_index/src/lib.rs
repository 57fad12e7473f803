// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Index: a 2D bounding volume hierarchy and the traversal primitives queries run on.
//!
//! - Build a [`Bvh`] over primitive boxes in one pass; it is read-only afterwards.
//! - Walk it with a [`Region`] (point, rectangle, circle or [`Ray`]) or ask for the
//!   `k` nearest primitives to a point.
//! - Everything that consumes a tree does so through the [`Traverse`] trait, so the
//!   linear-scan [`FlatVec`] can stand in wherever a hierarchy is expected.
//!
//! The crate does not batch, buffer, or reorder queries; `canopy_query` layers that on top.
//!
//! # Example
//!
//! ```rust
//! use canopy_index::{Aabb, Bvh, NearestAlgorithm, Ray, Region, Traverse};
//! use kurbo::{Point, Vec2};
//!
//! // A row of ten unit cells.
//! let cells: Vec<Aabb> = (0..10).map(|i| Aabb::from_xywh(i as f64, 0.0, 1.0, 1.0)).collect();
//! let bvh = Bvh::new(&cells);
//!
//! // Which cells does a ray starting inside cell 2 cross?
//! let ray = Ray::new(Point::new(2.5, 0.5), Vec2::new(1.0, 0.0));
//! let mut hits = Vec::new();
//! bvh.intersecting(&Region::Ray(ray), &mut |i| hits.push(i));
//! hits.sort();
//! assert_eq!(hits, (2..10).collect::<Vec<_>>());
//!
//! // The two cells nearest to a point, closest first.
//! let mut near = Vec::new();
//! bvh.nearest(Point::new(4.2, 3.0), 2, NearestAlgorithm::default(), &mut |i, _d| near.push(i));
//! assert_eq!(near, vec![4, 3]);
//! ```
//!
//! ## Nearest-neighbour ordering
//!
//! Neighbours come back in ascending `(distance, primitive index)` order for both
//! [`NearestAlgorithm`]s, so equal distances resolve to the lower index and the two
//! algorithms are interchangeable.
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs for coordinates.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod backends;
pub mod geometry;
pub mod traverse;
pub mod types;

pub use backends::bvh::Bvh;
pub use backends::flatvec::FlatVec;
pub use geometry::{Overlap, Ray, Region};
pub use traverse::{NearestAlgorithm, Traverse};
pub use types::Aabb;
