// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compressed per-predicate result lists.

use core::ops::Index;

use crate::error::QueryError;

/// Variable-length results for a batch of predicates, stored as an offsets array and a
/// flat values array.
///
/// For `n` predicates, `offsets` has `n + 1` non-decreasing entries starting at zero and
/// ending at `values.len()`; the results of predicate `i` are
/// `values[offsets[i]..offsets[i + 1]]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Csr<V> {
    offsets: Vec<usize>,
    values: Vec<V>,
}

impl<V> Csr<V> {
    /// `n` empty lists.
    pub fn empty(n: usize) -> Self {
        Self {
            offsets: vec![0; n + 1],
            values: Vec::new(),
        }
    }

    /// Validate and wrap an offsets array and its values.
    pub fn new(offsets: Vec<usize>, values: Vec<V>) -> Result<Self, QueryError> {
        match offsets.first() {
            None => return Err(QueryError::MalformedCsr { reason: "no offsets" }),
            Some(&first) if first != 0 => {
                return Err(QueryError::MalformedCsr {
                    reason: "first offset is not zero",
                });
            }
            _ => {}
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(QueryError::MalformedCsr {
                reason: "offsets decrease",
            });
        }
        if offsets.last() != Some(&values.len()) {
            return Err(QueryError::MalformedCsr {
                reason: "last offset does not match the number of values",
            });
        }
        Ok(Self { offsets, values })
    }

    /// Build from per-predicate counts and the concatenated values.
    pub fn from_counts(counts: &[usize], values: Vec<V>) -> Result<Self, QueryError> {
        Self::new(exclusive_prefix_sum(counts), values)
    }

    /// Exactly one value per predicate.
    pub fn one_each(values: Vec<V>) -> Self {
        Self {
            offsets: (0..=values.len()).collect(),
            values,
        }
    }

    pub(crate) fn from_raw(offsets: Vec<usize>, values: Vec<V>) -> Self {
        debug_assert_eq!(offsets.first(), Some(&0));
        debug_assert_eq!(offsets.last(), Some(&values.len()));
        Self { offsets, values }
    }

    /// Number of predicates.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// True when the batch had no predicates.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of values across all predicates.
    pub fn total(&self) -> usize {
        self.values.len()
    }

    /// Results of predicate `i`.
    pub fn get(&self, i: usize) -> Option<&[V]> {
        let start = *self.offsets.get(i)?;
        let end = *self.offsets.get(i + 1)?;
        Some(&self.values[start..end])
    }

    /// Number of results of every predicate.
    pub fn counts(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Per-predicate result slices, in batch order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[V]> + '_ {
        self.offsets
            .windows(2)
            .map(|w| &self.values[w[0]..w[1]])
    }

    /// The offsets array (`len() + 1` entries).
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The flat values array.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Split into `(offsets, values)`.
    pub fn into_parts(self) -> (Vec<usize>, Vec<V>) {
        (self.offsets, self.values)
    }

    /// Transform every value, keeping the layout.
    pub fn map<W>(self, f: impl FnMut(V) -> W) -> Csr<W> {
        Csr {
            offsets: self.offsets,
            values: self.values.into_iter().map(f).collect(),
        }
    }
}

impl<V> Index<usize> for Csr<V> {
    type Output = [V];

    fn index(&self, i: usize) -> &[V] {
        &self.values[self.offsets[i]..self.offsets[i + 1]]
    }
}

impl<V> FromIterator<Vec<V>> for Csr<V> {
    fn from_iter<I: IntoIterator<Item = Vec<V>>>(iter: I) -> Self {
        let mut offsets = vec![0];
        let mut values = Vec::new();
        for list in iter {
            values.extend(list);
            offsets.push(values.len());
        }
        Self { offsets, values }
    }
}

/// Offsets for the given counts: `n + 1` entries, starting at zero, each the sum of
/// all preceding counts.
pub fn exclusive_prefix_sum(counts: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    let mut running = 0;
    offsets.push(running);
    for &c in counts {
        running += c;
        offsets.push(running);
    }
    offsets
}
