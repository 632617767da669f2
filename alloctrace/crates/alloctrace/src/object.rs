//! Object identities, host events, and per-object allocation records.

use std::fmt;

use alloctrace_util::PathId;
use serde::{Deserialize, Serialize};

/// Host identity of an object, unique while the object is alive
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({:#x})", self.0)
    }
}

/// Coarse object kind reported by the host (a small integer)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(pub u32);

alloctrace_util::impl_idx!(TypeTag, "type tag");

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an object's owning type (its class)
///
/// Captured by value at allocation time. The host keeps the descriptor it
/// names valid for as long as the tracer may report it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerType(pub u64);

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Payload of the allocation hook
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationEvent<'a> {
    pub object: ObjectId,
    pub type_tag: TypeTag,
    pub owner: Option<OwnerType>,
    pub path: Option<&'a str>,
    pub line: u32,
}

impl<'a> AllocationEvent<'a> {
    /// Allocation with no owner and no call site
    pub fn new(object: ObjectId, type_tag: TypeTag) -> Self {
        Self {
            object,
            type_tag,
            owner: None,
            path: None,
            line: 0,
        }
    }

    /// Attach the call site the host attributed the allocation to
    pub fn at(mut self, path: &'a str, line: u32) -> Self {
        self.path = Some(path);
        self.line = line;
        self
    }

    /// Attach the owning type
    pub fn owned_by(mut self, owner: OwnerType) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Payload of the free hook
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeEvent {
    pub object: ObjectId,
    /// Type tag as the host sees it at free time
    pub type_tag: TypeTag,
    /// Bytes the object occupied when it was freed
    pub byte_size: u64,
}

impl FreeEvent {
    pub fn new(object: ObjectId, type_tag: TypeTag, byte_size: u64) -> Self {
        Self {
            object,
            type_tag,
            byte_size,
        }
    }
}

/// Where a record currently sits in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// In the live table
    Living,
    /// Removed from the live table and waiting in the free queue
    Freed,
}

/// Everything the tracer remembers about one tracked object
///
/// A record is owned by exactly one of: the live table, the free queue, or
/// the recycle pool. `next` is only meaningful while it is queued.
#[derive(Debug)]
pub struct AllocationRecord {
    pub object: ObjectId,
    pub liveness: Liveness,
    pub type_tag: TypeTag,
    pub owner: Option<OwnerType>,
    /// Epoch at allocation
    pub epoch: u64,
    /// 0 until freed
    pub byte_size: u64,
    /// Interned call-site path; the record holds one reference to it
    pub path: Option<PathId>,
    pub line: u32,
    /// Survived at least one collection before being freed
    pub promoted: bool,
    pub(crate) next: Option<Box<AllocationRecord>>,
}

impl AllocationRecord {
    pub(crate) fn blank() -> Self {
        Self {
            object: ObjectId(0),
            liveness: Liveness::Living,
            type_tag: TypeTag(0),
            owner: None,
            epoch: 0,
            byte_size: 0,
            path: None,
            line: 0,
            promoted: false,
            next: None,
        }
    }

    /// Overwrite every field for a fresh allocation
    ///
    /// Returns the path handle the record held before, which the caller must
    /// release.
    pub(crate) fn populate(
        &mut self,
        event: &AllocationEvent<'_>,
        path: Option<PathId>,
        epoch: u64,
    ) -> Option<PathId> {
        self.object = event.object;
        self.liveness = Liveness::Living;
        self.type_tag = event.type_tag;
        self.owner = event.owner;
        self.epoch = epoch;
        self.byte_size = 0;
        self.line = event.line;
        self.promoted = false;
        self.next = None;
        std::mem::replace(&mut self.path, path)
    }

    /// Age in collection cycles at `epoch`
    ///
    /// An epoch earlier than the allocation epoch (a host clock that went
    /// backwards) reads as age 0.
    #[inline]
    pub fn age_at(&self, epoch: u64) -> u64 {
        epoch.saturating_sub(self.epoch)
    }
}
