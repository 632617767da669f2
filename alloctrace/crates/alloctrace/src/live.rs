//! Live allocation table and record recycle pool
//!
//! Maps each tracked, not-yet-freed object to its [`AllocationRecord`].
//! Records leave the table on free and come back to the pool once the drain
//! has folded them, so steady-state allocation does not touch the heap.

use alloctrace_util::{PathId, PathInterner};
use rustc_hash::FxHashMap;

use crate::invariant;
use crate::object::{AllocationEvent, AllocationRecord, Liveness, ObjectId};

/// Outcome of placing an allocation in the table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// The identity already had a record, which was reused in place
    pub replaced: bool,
    /// Path the previous occupant held; the caller must release it
    pub stale_path: Option<PathId>,
}

/// Pool usage counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Allocations served from the pool
    pub hits: u64,
    /// Allocations that needed a fresh record
    pub misses: u64,
    /// Records currently pooled
    pub pooled: usize,
}

#[derive(Debug, Default)]
pub struct LiveTable {
    index: FxHashMap<ObjectId, Box<AllocationRecord>>,
    pool: Vec<Box<AllocationRecord>>,
    pool_limit: usize,
    pool_hits: u64,
    pool_misses: u64,
}

impl LiveTable {
    pub fn new(capacity: usize, pool_limit: usize) -> Self {
        let mut index = FxHashMap::default();
        index.reserve(capacity);
        Self {
            index,
            pool: Vec::new(),
            pool_limit,
            pool_hits: 0,
            pool_misses: 0,
        }
    }

    /// Record a new allocation
    ///
    /// `path` is an interned handle the caller already took a reference on;
    /// the record keeps that reference.
    pub fn record_allocation(
        &mut self,
        event: &AllocationEvent<'_>,
        path: Option<PathId>,
        epoch: u64,
    ) -> Placement {
        if let Some(record) = self.index.get_mut(&event.object) {
            let stale_path = record.populate(event, path, epoch);
            return Placement {
                replaced: true,
                stale_path,
            };
        }

        let mut record = match self.pool.pop() {
            Some(record) => {
                self.pool_hits += 1;
                record
            },
            None => {
                self.pool_misses += 1;
                Box::new(AllocationRecord::blank())
            },
        };
        let stale_path = record.populate(event, path, epoch);
        invariant!(
            stale_path.is_none(),
            "pooled record still held path {:?}",
            stale_path
        );
        self.index.insert(event.object, record);

        Placement {
            replaced: false,
            stale_path: None,
        }
    }

    /// Take the record for `object` out of the table
    pub fn remove(&mut self, object: ObjectId) -> Option<Box<AllocationRecord>> {
        self.index.remove(&object)
    }

    pub fn get(&self, object: ObjectId) -> Option<&AllocationRecord> {
        self.index.get(&object).map(|record| &**record)
    }

    /// Return a finished record to the pool
    ///
    /// The record must no longer hold a path reference.
    pub fn recycle(&mut self, mut record: Box<AllocationRecord>) {
        invariant!(
            record.path.is_none(),
            "recycled record for {:?} still holds a path",
            record.object
        );
        invariant!(
            record.next.is_none(),
            "recycled record for {:?} is still linked",
            record.object
        );
        if self.pool.len() < self.pool_limit {
            record.liveness = Liveness::Living;
            self.pool.push(record);
        }
    }

    /// Every living record, in no particular order
    pub fn records(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.index.values().map(|record| &**record)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drop every living record, releasing the paths they hold
    pub fn clear(&mut self, interner: &mut PathInterner) {
        let drained: Vec<_> = self.index.drain().map(|(_, record)| record).collect();
        for mut record in drained {
            if let Some(path) = record.path.take() {
                interner.release(path);
            }
            self.recycle(record);
        }
    }

    /// Release pooled records back to the allocator
    pub fn shrink_pool(&mut self) {
        self.pool = Vec::new();
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            hits: self.pool_hits,
            misses: self.pool_misses,
            pooled: self.pool.len(),
        }
    }
}
