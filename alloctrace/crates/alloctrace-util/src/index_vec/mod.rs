//! IndexVec - A vector indexed by a specific type.
//!
//! This module provides [`IndexVec`], a typed vector that uses a custom index type
//! instead of `usize`. The tracer keeps several parallel tables (interner
//! slots, per-type counters, histogram rows); typed indices keep a `PathId`
//! from ever being used to address a counter row.
//!
//! # Example
//!
//! ```
//! use alloctrace_util::index_vec::{IndexVec, Idx};
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq)]
//! struct SlotId(u32);
//!
//! impl Idx for SlotId {
//!     fn from_usize(idx: usize) -> Self { SlotId(idx as u32) }
//!     fn index(self) -> usize { self.0 as usize }
//! }
//!
//! let mut slots: IndexVec<SlotId, u64> = IndexVec::new();
//! let id = slots.push(42);
//! assert_eq!(slots[id], 42);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Trait for types that can be used as indices
///
/// This trait must be implemented by any type that wants to be used as an
/// index for [`IndexVec`]. The type must be convertible to and from `usize`.
///
/// # Requirements
///
/// - Must be `Copy` for efficient passing
/// - Must be `Eq + PartialEq` for comparison
/// - Must implement `from_usize` and `index` for conversion
pub trait Idx: Copy + Eq + PartialEq {
    /// Convert from usize to index type
    ///
    /// # Panics
    ///
    /// Implementations may panic if the usize value is too large to fit
    /// in the index type.
    fn from_usize(idx: usize) -> Self;

    /// Convert index to usize for array indexing
    fn index(self) -> usize;
}

impl Idx for usize {
    #[inline]
    fn from_usize(idx: usize) -> Self {
        idx
    }

    #[inline]
    fn index(self) -> usize {
        self
    }
}

/// A vector indexed by a specific type
///
/// `IndexVec` is a wrapper around `Vec<T>` that uses a typed index `I`
/// instead of `usize`. The index type is a zero-cost abstraction; the
/// layout is exactly that of `Vec<T>`.
pub struct IndexVec<I, T> {
    raw: Vec<T>,
    _marker: PhantomData<fn(&I)>,
}

impl<I, T> IndexVec<I, T> {
    /// Create an empty IndexVec
    ///
    /// # Examples
    ///
    /// ```
    /// use alloctrace_util::index_vec::IndexVec;
    ///
    /// let vec: IndexVec<usize, i32> = IndexVec::new();
    /// assert!(vec.is_empty());
    /// ```
    #[inline]
    pub fn new() -> Self {
        Self {
            raw: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Create an IndexVec with the specified capacity
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
            _marker: PhantomData,
        }
    }

    /// Returns the number of elements in the vector
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if the vector contains no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Clear all elements from the vector, keeping the allocated capacity
    #[inline]
    pub fn clear(&mut self) {
        self.raw.clear()
    }

    /// Get a slice view of the underlying data
    ///
    /// # Examples
    ///
    /// ```
    /// use alloctrace_util::index_vec::IndexVec;
    ///
    /// let mut vec: IndexVec<usize, i32> = IndexVec::new();
    /// vec.push(1);
    /// vec.push(2);
    /// assert_eq!(vec.as_slice(), &[1, 2]);
    /// ```
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.raw
    }

    /// Iterate over the elements in index order
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.raw.iter()
    }

    /// Consume the vector and return the underlying `Vec`
    #[inline]
    pub fn into_raw(self) -> Vec<T> {
        self.raw
    }
}

impl<I: Idx, T> IndexVec<I, T> {
    /// Wrap an existing `Vec`, element `n` becoming index `I::from_usize(n)`
    #[inline]
    pub fn from_raw(raw: Vec<T>) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Push an element and return its typed index
    ///
    /// # Examples
    ///
    /// ```
    /// use alloctrace_util::index_vec::{IndexVec, Idx};
    ///
    /// #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// struct Id(u32);
    /// impl Idx for Id {
    ///     fn from_usize(i: usize) -> Self { Id(i as u32) }
    ///     fn index(self) -> usize { self.0 as usize }
    /// }
    ///
    /// let mut vec: IndexVec<Id, i32> = IndexVec::new();
    /// let idx = vec.push(42);
    /// assert_eq!(vec[idx], 42);
    /// ```
    #[inline]
    pub fn push(&mut self, value: T) -> I {
        let idx = I::from_usize(self.raw.len());
        self.raw.push(value);
        idx
    }

    /// The index the next `push` will return
    #[inline]
    pub fn next_index(&self) -> I {
        I::from_usize(self.raw.len())
    }

    /// Get a reference to an element, or None if out of bounds
    #[inline]
    pub fn get(&self, index: I) -> Option<&T> {
        self.raw.get(index.index())
    }

    /// Get a mutable reference to an element, or None if out of bounds
    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut T> {
        self.raw.get_mut(index.index())
    }

    /// Iterate over (index, element) pairs
    ///
    /// # Examples
    ///
    /// ```
    /// use alloctrace_util::index_vec::IndexVec;
    ///
    /// let mut vec: IndexVec<usize, &str> = IndexVec::new();
    /// vec.push("a");
    /// vec.push("b");
    /// let pairs: Vec<_> = vec.iter_enumerated().collect();
    /// assert_eq!(pairs, vec![(0, &"a"), (1, &"b")]);
    /// ```
    #[inline]
    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, &T)> {
        self.raw
            .iter()
            .enumerate()
            .map(|(i, t)| (I::from_usize(i), t))
    }

    /// Resize the vector to the specified length using a closure
    ///
    /// If the new length is greater than the current length, new elements
    /// are created by calling the provided closure. If less, the vector is truncated.
    #[inline]
    pub fn resize_with<F>(&mut self, len: usize, f: F)
    where
        F: FnMut() -> T,
    {
        self.raw.resize_with(len, f)
    }

    /// Get a mutable reference to `index`, growing the vector first if needed
    ///
    /// Slots created by the growth are filled with `T::default()`. The vector
    /// never shrinks through this call.
    ///
    /// # Examples
    ///
    /// ```
    /// use alloctrace_util::index_vec::IndexVec;
    ///
    /// let mut counts: IndexVec<usize, u64> = IndexVec::new();
    /// *counts.ensure_mut(3) += 1;
    /// assert_eq!(counts.as_slice(), &[0, 0, 0, 1]);
    /// ```
    #[inline]
    pub fn ensure_mut(&mut self, index: I) -> &mut T
    where
        T: Default,
    {
        let slot = index.index();
        if slot >= self.raw.len() {
            self.raw.resize_with(slot + 1, T::default);
        }
        &mut self.raw[slot]
    }
}

impl<I: Idx, T> Index<I> for IndexVec<I, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: I) -> &T {
        &self.raw[index.index()]
    }
}

impl<I: Idx, T> IndexMut<I> for IndexVec<I, T> {
    #[inline]
    fn index_mut(&mut self, index: I) -> &mut T {
        &mut self.raw[index.index()]
    }
}

impl<I, T> Default for IndexVec<I, T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<I, T: Clone> Clone for IndexVec<I, T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<I, T: PartialEq> PartialEq for IndexVec<I, T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<I, T: Eq> Eq for IndexVec<I, T> {}

impl<I, T: fmt::Debug> fmt::Debug for IndexVec<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.raw, f)
    }
}

/// Implement [`Idx`] for a newtype over `u32`
///
/// The type keeps its own derives; the optional message names what
/// overflowed when an index does not fit in `u32`.
///
/// # Examples
///
/// ```
/// use alloctrace_util::impl_idx;
/// use alloctrace_util::index_vec::IndexVec;
///
/// #[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// struct RowId(u32);
/// impl_idx!(RowId, "row");
///
/// let mut vec: IndexVec<RowId, i32> = IndexVec::new();
/// let idx = vec.push(42);
/// assert_eq!(vec[idx], 42);
/// ```
#[macro_export]
macro_rules! impl_idx {
    ($name:ident) => {
        $crate::impl_idx!($name, stringify!($name));
    };
    ($name:ident, $what:expr) => {
        impl $crate::index_vec::Idx for $name {
            #[inline]
            fn from_usize(idx: usize) -> Self {
                assert!(idx <= u32::MAX as usize, "{} {} exceeds u32::MAX", $what, idx);
                $name(idx as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}
