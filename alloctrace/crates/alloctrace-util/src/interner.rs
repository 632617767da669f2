//! Reference-counted path interner.
//!
//! This module provides the string pool used for allocation-site paths:
//! - Exactly one canonical `Arc<str>` per distinct live text
//! - Strict reference counting: a path is dropped the moment its last
//!   holder releases it
//! - Small integer handles ([`PathId`]) that are cheap to hash and copy
//! - Statistics tracking for profiling
//!
//! # Performance Characteristics
//!
//! - **Interning (hit)**: O(1) - hash lookup plus a counter increment
//! - **Interning (miss)**: O(1) amortized - one text allocation, slot reuse
//! - **Retain / release**: O(1) - slot access by index
//! - **Handle comparison**: O(1) - integer comparison
//!
//! # Thread Safety
//!
//! The interner takes `&mut self` for every mutation and does no locking of
//! its own. It is `Send`, so an owner that is shared between threads can
//! wrap it in a mutex.
//!
//! # Consistency
//!
//! Releasing a handle more times than it was interned or retained is a bug in
//! the caller, and the pool can no longer vouch for any handle it has issued.
//! [`PathInterner::release`] and [`PathInterner::retain`] panic in that case
//! rather than returning an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ahash::RandomState;

use crate::error::{InternerError, InternerResult};
use crate::index_vec::IndexVec;

/// Handle to an interned path
///
/// Two handles issued by the same interner compare equal exactly when they
/// name the same text. A handle is only meaningful while at least one
/// reference to it is held.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathId(u32);

impl PathId {
    /// Raw slot index, stable while the handle is referenced
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

crate::impl_idx!(PathId, "path slot");

impl fmt::Debug for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathId({})", self.0)
    }
}

/// Statistics about interner usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InternerStats {
    /// Number of distinct texts currently interned
    pub count: usize,
    /// Number of slots ever allocated (live + vacant)
    pub slots: usize,
    /// Number of `intern` calls that found the text already present
    pub hits: usize,
    /// Number of `intern` calls that created a new canonical copy
    pub misses: usize,
}

impl InternerStats {
    /// Calculate the hit rate (0.0 - 1.0)
    ///
    /// # Examples
    ///
    /// ```
    /// use alloctrace_util::InternerStats;
    ///
    /// let stats = InternerStats { count: 1, slots: 1, hits: 3, misses: 1 };
    /// assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    /// ```
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Slot {
    text: Option<Arc<str>>,
    refs: u32,
}

/// Reference-counted pool of source paths
///
/// # Examples
///
/// ```
/// use alloctrace_util::PathInterner;
///
/// let mut paths = PathInterner::new();
/// let a = paths.intern("app/models/user.rb");
/// let b = paths.intern("app/models/user.rb");
/// assert_eq!(a, b);
/// assert_eq!(paths.ref_count(a), 2);
///
/// paths.release(a);
/// paths.release(b);
/// assert!(paths.is_empty());
/// ```
#[derive(Default)]
pub struct PathInterner {
    lookup: HashMap<Arc<str>, PathId, RandomState>,
    slots: IndexVec<PathId, Slot>,
    vacant: Vec<PathId>,
    hits: usize,
    misses: usize,
}

impl PathInterner {
    /// Create an empty interner
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`, returning its canonical handle
    ///
    /// Increments the reference count of an existing entry, or creates one
    /// with a count of 1.
    pub fn intern(&mut self, text: &str) -> PathId {
        if let Some(&id) = self.lookup.get(text) {
            self.hits += 1;
            self.slots[id].refs += 1;
            return id;
        }

        self.misses += 1;
        let canonical: Arc<str> = Arc::from(text);
        let slot = Slot {
            text: Some(canonical.clone()),
            refs: 1,
        };
        let id = match self.vacant.pop() {
            Some(id) => {
                self.slots[id] = slot;
                id
            }
            None => self.slots.push(slot),
        };
        self.lookup.insert(canonical, id);
        id
    }

    /// Take an additional reference to an already-interned handle
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently interned.
    pub fn retain(&mut self, id: PathId) -> PathId {
        let slot = self.live_slot_mut(id, "retain");
        slot.refs += 1;
        id
    }

    /// Drop one reference to `id`, freeing the canonical text at zero
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently interned: the caller released more
    /// references than it held.
    pub fn release(&mut self, id: PathId) {
        let slot = self.live_slot_mut(id, "release");
        slot.refs -= 1;
        if slot.refs > 0 {
            return;
        }

        if let Some(text) = slot.text.take() {
            self.lookup.remove(&*text);
        }
        self.vacant.push(id);
    }

    /// Canonical text for `id`
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently interned.
    pub fn resolve(&self, id: PathId) -> &Arc<str> {
        match self.try_resolve(id) {
            Ok(text) => text,
            Err(err) => panic!("path interner consistency violated: {}", err),
        }
    }

    /// Canonical text for `id`, or why it cannot be resolved
    pub fn try_resolve(&self, id: PathId) -> InternerResult<&Arc<str>> {
        match self.slots.get(id) {
            None => Err(InternerError::UnknownHandle { index: id.0 }),
            Some(Slot { text: Some(text), .. }) => Ok(text),
            Some(Slot { text: None, .. }) => Err(InternerError::Released { index: id.0 }),
        }
    }

    /// Current reference count of `id` (0 when not interned)
    pub fn ref_count(&self, id: PathId) -> u32 {
        self.slots.get(id).map_or(0, |slot| slot.refs)
    }

    /// Number of distinct texts currently interned
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// True when nothing is interned
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Drop every entry regardless of reference counts
    ///
    /// Every outstanding handle becomes invalid. Statistics are kept.
    pub fn clear(&mut self) {
        self.lookup.clear();
        self.slots.clear();
        self.vacant.clear();
    }

    /// Get statistics about the interner for profiling
    pub fn stats(&self) -> InternerStats {
        InternerStats {
            count: self.lookup.len(),
            slots: self.slots.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    fn live_slot_mut(&mut self, id: PathId, operation: &str) -> &mut Slot {
        match self.slots.get_mut(id) {
            Some(slot) if slot.refs > 0 => slot,
            Some(_) => panic!(
                "path interner consistency violated: {} of released handle {}",
                operation, id.0
            ),
            None => panic!(
                "path interner consistency violated: {} of unknown handle {}",
                operation, id.0
            ),
        }
    }
}

impl fmt::Debug for PathInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathInterner")
            .field("count", &self.lookup.len())
            .field("slots", &self.slots.len())
            .finish()
    }
}
