// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree backends implementing [`Traverse`](crate::Traverse).
//!
//! - `flatvec`: flat vector with linear scans (small, simple, an oracle for tests).
//! - `bvh`: bulk-built binary hierarchy with SAH-like splits.
//!
//! SAH note
//! --------
//! For a split point `k` along a sorted axis we minimize:
//!
//! `cost(k) = area(LB_k) * k + area(RB_k) * (n - k)`
//!
//! where `LB_k` and `RB_k` are the bounding boxes of the first `k` and remaining `n - k` items.
//! We evaluate all `k` in O(n) per axis using prefix/suffix bounding boxes, and pick the lowest cost.

pub mod bvh;
pub mod flatvec;
