// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Callbacks: what a query call stores for each match.
//!
//! An [`InlineCallback`] runs during traversal, once per match, and may emit any number
//! of outputs. A [`PostCallback`] runs once, after traversal, over the complete set of
//! matches for the batch. [`Callback`] holds one of the two; the output type both
//! produce is checked when the call is compiled, not when it runs.

use core::convert::Infallible;
use core::marker::PhantomData;

use crate::csr::Csr;
use crate::predicate::{Predicate, PredicateSource};

/// One match of a predicate against a primitive.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Hit {
    /// Index of the matched primitive in the tree.
    pub primitive: usize,
    /// Distance from the query point, for nearest predicates.
    pub distance: Option<f64>,
}

/// Per-match callback run during traversal.
///
/// May be invoked concurrently for different predicates, and for the same predicate
/// twice when buffering recounts, so it must be a pure function of its arguments.
pub trait InlineCallback<D>: Sync {
    /// What gets stored per emitted result.
    type Output: Send;

    /// Handle one match, calling `emit` zero or more times.
    fn on_hit(&self, predicate: &Predicate<D>, hit: Hit, emit: &mut dyn FnMut(Self::Output));
}

/// Whole-batch callback run after traversal.
pub trait PostCallback<D>: Sync {
    /// What gets stored per result.
    type Output: Send;

    /// Turn the batch's matches (in caller order) into the final results.
    fn process(&self, predicates: &dyn PredicateSource<D>, hits: Csr<Hit>) -> Csr<Self::Output>;
}

/// Either kind of callback.
///
/// Build with [`Callback::inline`] or [`Callback::post_process`] so the unused side is
/// filled with an uninhabited placeholder.
#[derive(Clone, Debug)]
pub enum Callback<I, P> {
    /// Run during traversal.
    Inline(I),
    /// Run after traversal.
    PostProcess(P),
}

impl<I, V> Callback<I, NoPost<V>> {
    /// Wrap an inline callback.
    pub fn inline(callback: I) -> Self {
        Self::Inline(callback)
    }
}

impl<P, V> Callback<NoInline<V>, P> {
    /// Wrap a post-processing callback.
    pub fn post_process(callback: P) -> Self {
        Self::PostProcess(callback)
    }
}

/// Placeholder for the absent inline side of a [`Callback`]; cannot be constructed.
#[derive(Debug)]
pub struct NoInline<V>(Infallible, PhantomData<fn() -> V>);

impl<D, V: Send> InlineCallback<D> for NoInline<V> {
    type Output = V;

    fn on_hit(&self, _: &Predicate<D>, _: Hit, _: &mut dyn FnMut(V)) {
        match self.0 {}
    }
}

/// Placeholder for the absent post-processing side of a [`Callback`]; cannot be
/// constructed.
#[derive(Debug)]
pub struct NoPost<V>(Infallible, PhantomData<fn() -> V>);

impl<D, V: Send> PostCallback<D> for NoPost<V> {
    type Output = V;

    fn process(&self, _: &dyn PredicateSource<D>, _: Csr<Hit>) -> Csr<V> {
        match self.0 {}
    }
}

/// Stores the index of every matched primitive.
#[derive(Copy, Clone, Debug, Default)]
pub struct PrimitiveIndex;

impl<D> InlineCallback<D> for PrimitiveIndex {
    type Output = usize;

    fn on_hit(&self, _: &Predicate<D>, hit: Hit, emit: &mut dyn FnMut(usize)) {
        emit(hit.primitive);
    }
}

/// Stores every [`Hit`] as is.
#[derive(Copy, Clone, Debug, Default)]
pub struct HitRecord;

impl<D> InlineCallback<D> for HitRecord {
    type Output = Hit;

    fn on_hit(&self, _: &Predicate<D>, hit: Hit, emit: &mut dyn FnMut(Hit)) {
        emit(hit);
    }
}
