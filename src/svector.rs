//! Ordered container with an optional comparator.

use std::cmp::Ordering;

use smallvec::SmallVec;

/// Elements kept inline before the storage spills to the heap.
const INLINE_LEN: usize = 2;

/// A dynamic ordered array.
///
/// With a comparator, [`SVector::insert`] maintains sorted order through
/// binary-search insertion and rejects duplicates, which makes repeated
/// inserts idempotent. Without one, elements are appended at the tail.
///
/// Storage is inline up to two elements before spilling to the heap,
/// sized for the short edge and marker sets the engine keeps per node.
///
/// The container never drops anything beyond its own storage; element
/// ownership semantics are whatever `T` itself carries.
#[derive(Debug, Clone)]
pub struct SVector<T> {
    items: SmallVec<[T; INLINE_LEN]>,
    cmp: Option<fn(&T, &T) -> Ordering>,
}

impl<T> SVector<T> {
    /// Creates an unordered vector with the given reserved capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: SmallVec::with_capacity(capacity),
            cmp: None,
        }
    }

    /// Creates a sorted vector using `cmp` for ordering and equality.
    pub fn with_compare(capacity: usize, cmp: fn(&T, &T) -> Ordering) -> Self {
        Self {
            items: SmallVec::with_capacity(capacity),
            cmp: Some(cmp),
        }
    }

    /// Inserts an element.
    ///
    /// Returns `false` when a comparator is present and an equal element
    /// already exists; the vector is left unchanged in that case.
    pub fn insert(&mut self, value: T) -> bool {
        match self.cmp {
            Some(cmp) => match self.items.binary_search_by(|probe| cmp(probe, &value)) {
                Ok(_) => false,
                Err(pos) => {
                    self.items.insert(pos, value);
                    true
                }
            },
            None => {
                self.items.push(value);
                true
            }
        }
    }

    /// Removes the element equal to `value` under the comparator.
    ///
    /// Returns the removed element, or `None` if it was not present or the
    /// vector has no comparator.
    pub fn remove(&mut self, value: &T) -> Option<T> {
        let cmp = self.cmp?;
        match self.items.binary_search_by(|probe| cmp(probe, value)) {
            Ok(pos) => Some(self.items.remove(pos)),
            Err(_) => None,
        }
    }

    /// Returns `true` when an element equal to `value` is present.
    pub fn contains(&self, value: &T) -> bool {
        match self.cmp {
            Some(cmp) => self
                .items
                .binary_search_by(|probe| cmp(probe, value))
                .is_ok(),
            None => false,
        }
    }

    /// Removes and returns the tail element.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Returns the number of stored elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when no elements are stored.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the element at `index` in stored order.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterates elements in stored order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Removes every element, keeping the storage.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Returns the stored elements as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a SVector<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Ord> SVector<T> {
    /// Creates a vector ordered by `T`'s own ordering.
    pub fn sorted(capacity: usize) -> Self {
        Self::with_compare(capacity, T::cmp)
    }
}
