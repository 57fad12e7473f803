// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Query: batched queries over a [`canopy_index`] tree.
//!
//! A query call takes a batch of [`Predicate`]s, all spatial or all nearest, runs them
//! against any [`Traverse`](canopy_index::Traverse) tree in parallel, and returns a
//! [`Csr`] holding each predicate's results in the order the caller supplied them.
//!
//! - [`TraversalPolicy`] picks the buffering strategy (exact two-pass, speculative
//!   with recount, or speculative with failure), Z-order reordering, and the nearest
//!   search algorithm.
//! - [`Callback`] decides what is stored per match: an [`InlineCallback`] runs during
//!   traversal, a [`PostCallback`] runs once over every [`Hit`] of the batch.
//! - [`query_indices`] and [`query_nearest_with_distances`] cover the common cases.
//!
//! # Example
//!
//! ```rust
//! use canopy_index::{Aabb, Bvh};
//! use canopy_query::{Predicate, TraversalPolicy, query_indices, query_nearest_with_distances};
//! use kurbo::Point;
//!
//! let cells: Vec<Aabb> = (0..8).map(|i| Aabb::from_xywh(i as f64, 0.0, 1.0, 1.0)).collect();
//! let bvh = Bvh::new(&cells);
//!
//! let boxes = vec![
//!     Predicate::intersects(Aabb::new(1.5, 0.2, 3.5, 0.8), ()),
//!     Predicate::intersects(Point::new(6.5, 0.5), ()),
//! ];
//! // Reserve two results per predicate; the first one needs three, so it is recounted.
//! let policy = TraversalPolicy::default().with_buffer_size(2);
//! let hits = query_indices(&bvh, &boxes, &policy).unwrap();
//! let mut first = hits[0].to_vec();
//! first.sort();
//! assert_eq!(first, vec![1, 2, 3]);
//! assert_eq!(&hits[1], &[6]);
//!
//! let near = vec![Predicate::nearest((9.0, 0.5), 2, ())];
//! let found = query_nearest_with_distances(&bvh, &near, &TraversalPolicy::default()).unwrap();
//! assert_eq!(found.indices, vec![7, 6]);
//! assert_eq!(found.distances, vec![1.0, 2.0]);
//! ```

mod buffer;
mod callback;
mod csr;
mod dispatch;
mod error;
mod permutation;
mod policy;
mod predicate;
pub mod reorder;

pub use callback::{Callback, Hit, HitRecord, InlineCallback, NoInline, NoPost, PostCallback, PrimitiveIndex};
pub use csr::{Csr, exclusive_prefix_sum};
pub use dispatch::{NearestNeighbors, query, query_indices, query_nearest_with_distances};
pub use error::{Overflow, QueryError};
pub use permutation::{Identity, Permutation, SlotMap};
pub use policy::{BufferPolicy, OnOverflow, TraversalPolicy};
pub use predicate::{Intersects, Nearest, Predicate, PredicateKind, PredicateSource};
