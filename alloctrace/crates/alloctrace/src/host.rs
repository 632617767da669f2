//! Host runtime capabilities consumed by the tracer
//!
//! The tracer never reaches into the host directly. Everything it needs to
//! know about the collector (the current epoch, whether an object survived a
//! collection, how to run work later at a safe point) comes through [`Host`].
//!
//! [`ScriptedHost`] is a deterministic in-memory implementation used for
//! replaying recorded event streams and in tests.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::object::{ObjectId, OwnerType, TypeTag};

/// Hook installed in the host collector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    Allocation,
    Free,
}

/// Current truth about a still-living object, as reported by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveRefresh {
    pub type_tag: TypeTag,
    pub owner: Option<OwnerType>,
}

/// Capabilities the host runtime provides to the tracer
#[cfg_attr(test, mockall::automock)]
pub trait Host {
    /// Collector generation counter; advances once per collection cycle
    fn current_epoch(&self) -> u64;

    /// Ask for [`Tracer::run_deferred_drain`](crate::Tracer::run_deferred_drain)
    /// to be invoked later at a safe point
    ///
    /// The tracer calls this at most once per empty-to-pending transition of
    /// its free queue.
    fn schedule_drain(&mut self);

    /// Enable or disable one of the tracer's hooks
    fn set_hook(&mut self, hook: HookKind, enabled: bool);

    /// Whether the object survived at least one collection
    ///
    /// Queried once per free event, before the host reclaims the object.
    fn survived_collection(&self, object: ObjectId) -> bool;

    /// Re-read a living object's type tag and owning type
    ///
    /// Consulted for every live record while building a result view. `None`
    /// keeps the values captured at allocation.
    fn refresh_live(&self, _object: ObjectId) -> Option<LiveRefresh> {
        None
    }
}

/// A host whose collector is driven by hand
///
/// # Examples
///
/// ```
/// use alloctrace::{Host, ScriptedHost};
///
/// let mut host = ScriptedHost::new();
/// host.advance_epoch(2);
/// assert_eq!(host.current_epoch(), 2);
///
/// host.schedule_drain();
/// assert!(host.take_pending_drain());
/// assert!(!host.take_pending_drain());
/// ```
#[derive(Debug, Default, Clone)]
pub struct ScriptedHost {
    epoch: u64,
    drain_requests: usize,
    pending_drain: bool,
    allocation_hook: bool,
    free_hook: bool,
    promoted: FxHashSet<ObjectId>,
    refreshes: FxHashMap<ObjectId, LiveRefresh>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate `cycles` completed collections, saturating at `u64::MAX`
    pub fn advance_epoch(&mut self, cycles: u64) {
        self.epoch = self.epoch.saturating_add(cycles);
    }

    /// Advance the epoch unless it would overflow
    ///
    /// Returns the new epoch; the epoch is unchanged on `None`.
    pub fn try_advance_epoch(&mut self, cycles: u64) -> Option<u64> {
        self.epoch = self.epoch.checked_add(cycles)?;
        Some(self.epoch)
    }

    /// Jump the epoch to an absolute value
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    /// Consume an outstanding drain request, if any
    pub fn take_pending_drain(&mut self) -> bool {
        std::mem::take(&mut self.pending_drain)
    }

    /// Whether a drain request is waiting to be run
    pub fn has_pending_drain(&self) -> bool {
        self.pending_drain
    }

    /// Total `schedule_drain` calls received
    pub fn drain_requests(&self) -> usize {
        self.drain_requests
    }

    /// Current state of a hook
    pub fn hook_enabled(&self, hook: HookKind) -> bool {
        match hook {
            HookKind::Allocation => self.allocation_hook,
            HookKind::Free => self.free_hook,
        }
    }

    /// Mark an object as having survived a collection
    pub fn mark_promoted(&mut self, object: ObjectId) {
        self.promoted.insert(object);
    }

    /// Forget survival information once the object is gone
    pub fn forget(&mut self, object: ObjectId) {
        self.promoted.remove(&object);
        self.refreshes.remove(&object);
    }

    /// Report different type information for a living object
    pub fn set_refresh(&mut self, object: ObjectId, refresh: LiveRefresh) {
        self.refreshes.insert(object, refresh);
    }
}

impl Host for ScriptedHost {
    fn current_epoch(&self) -> u64 {
        self.epoch
    }

    fn schedule_drain(&mut self) {
        self.drain_requests += 1;
        self.pending_drain = true;
    }

    fn set_hook(&mut self, hook: HookKind, enabled: bool) {
        match hook {
            HookKind::Allocation => self.allocation_hook = enabled,
            HookKind::Free => self.free_hook = enabled,
        }
    }

    fn survived_collection(&self, object: ObjectId) -> bool {
        self.promoted.contains(&object)
    }

    fn refresh_live(&self, object: ObjectId) -> Option<LiveRefresh> {
        self.refreshes.get(&object).copied()
    }
}
