// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mapping between traversal positions and the caller's predicate order.
//!
//! Predicates may be traversed in a different order than the caller supplied them.
//! A [`SlotMap`] says, for each traversal position, which caller index (the *slot*)
//! it stands for, so results land back in caller order regardless of traversal order.

use crate::error::QueryError;

/// Bijection between traversal positions and caller slots.
pub trait SlotMap: Sync {
    /// Number of predicates.
    fn len(&self) -> usize;

    /// True when there are no predicates.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Caller index of the predicate traversed at `position`.
    fn slot(&self, position: usize) -> usize;

    /// Traversal position of caller index `slot`.
    fn position(&self, slot: usize) -> usize;
}

/// Traversal in caller order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Identity(pub usize);

impl SlotMap for Identity {
    fn len(&self) -> usize {
        self.0
    }

    fn slot(&self, position: usize) -> usize {
        position
    }

    fn position(&self, slot: usize) -> usize {
        slot
    }
}

/// An explicit permutation of `0..len`, stored with its inverse.
///
/// `forward[position]` is the slot traversed at `position`.
#[derive(Clone, PartialEq, Eq)]
pub struct Permutation {
    forward: Vec<usize>,
    inverse: Vec<usize>,
}

impl core::fmt::Debug for Permutation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Permutation")
            .field("len", &self.forward.len())
            .finish_non_exhaustive()
    }
}

impl Permutation {
    /// The identity permutation on `0..n`.
    pub fn identity(n: usize) -> Self {
        let forward: Vec<usize> = (0..n).collect();
        Self {
            inverse: forward.clone(),
            forward,
        }
    }

    /// Check that `forward` is a bijection on `0..forward.len()` and wrap it.
    pub fn from_vec(forward: Vec<usize>) -> Result<Self, QueryError> {
        let len = forward.len();
        let mut inverse = vec![usize::MAX; len];
        for (position, &slot) in forward.iter().enumerate() {
            match inverse.get_mut(slot) {
                Some(cell) if *cell == usize::MAX => *cell = position,
                _ => return Err(QueryError::InvalidPermutation { len, value: slot }),
            }
        }
        Ok(Self { forward, inverse })
    }

    /// Wrap a vector already known to be a rearrangement of `0..len`.
    pub(crate) fn from_bijection(forward: Vec<usize>) -> Self {
        let mut inverse = vec![0; forward.len()];
        for (position, &slot) in forward.iter().enumerate() {
            inverse[slot] = position;
        }
        Self { forward, inverse }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// True for the permutation of nothing.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Slots in traversal order.
    pub fn as_slice(&self) -> &[usize] {
        &self.forward
    }

    /// The inverse permutation.
    pub fn inverse(&self) -> Self {
        Self {
            forward: self.inverse.clone(),
            inverse: self.forward.clone(),
        }
    }

    /// Reorder caller-ordered `items` into traversal order.
    pub fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        debug_assert_eq!(items.len(), self.len());
        self.forward.iter().map(|&slot| items[slot].clone()).collect()
    }

    /// True if no element moves.
    pub fn is_identity(&self) -> bool {
        self.forward.iter().enumerate().all(|(i, &s)| i == s)
    }
}

impl SlotMap for Permutation {
    fn len(&self) -> usize {
        self.forward.len()
    }

    fn slot(&self, position: usize) -> usize {
        self.forward[position]
    }

    fn position(&self, slot: usize) -> usize {
        self.inverse[slot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_rejects_repeats_and_out_of_range() {
        assert!(Permutation::from_vec(vec![0, 0]).is_err());
        assert!(Permutation::from_vec(vec![0, 2]).is_err());
        assert_eq!(
            Permutation::from_vec(vec![1, 3, 0]),
            Err(QueryError::InvalidPermutation { len: 3, value: 3 })
        );
    }

    #[test]
    fn apply_then_inverse_restores_order() {
        let p = Permutation::from_vec(vec![2, 0, 3, 1]).unwrap();
        let items = ['a', 'b', 'c', 'd'];
        let moved = p.apply(&items);
        assert_eq!(moved, vec!['c', 'a', 'd', 'b']);
        assert_eq!(p.inverse().apply(&moved), items.to_vec());
        for s in 0..4 {
            assert_eq!(p.slot(p.position(s)), s);
        }
    }

    #[test]
    fn identity_is_identity() {
        assert!(Permutation::identity(5).is_identity());
        assert!(!Permutation::from_vec(vec![1, 0]).unwrap().is_identity());
        let id = Identity(3);
        assert_eq!((id.slot(2), id.position(1), id.len()), (2, 1, 3));
    }
}
