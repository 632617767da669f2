//! Deferred free queue
//!
//! The free hook runs where hashing and table insertion are too expensive,
//! so freed records are only prepended here (O(1)). The first record to
//! land while no drain is outstanding asks the host for a drain job; further
//! frees ride on that request until the job starts.
//!
//! ```text
//!   free hook ──push──▶ head ─▶ rec ─▶ rec ─▶ rec ─▶ ∅
//!                        │
//!   drain job ◀─take_chain (whole list, head becomes empty)
//! ```

use alloctrace_util::PathInterner;

use crate::object::{AllocationRecord, Liveness};

#[derive(Debug, Default)]
pub struct FreeQueue {
    head: Option<Box<AllocationRecord>>,
    len: usize,
    peak: usize,
    drain_requested: bool,
}

impl FreeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a freed record
    ///
    /// Returns true when the caller must schedule a drain job: no request is
    /// outstanding yet.
    pub fn push(&mut self, mut record: Box<AllocationRecord>) -> bool {
        record.liveness = Liveness::Freed;
        record.next = self.head.take();
        self.head = Some(record);
        self.len += 1;
        self.peak = self.peak.max(self.len);

        let schedule = !self.drain_requested;
        self.drain_requested = true;
        schedule
    }

    /// Take ownership of every queued record, leaving the queue empty
    ///
    /// The outstanding drain request, if any, stays outstanding.
    pub fn take_chain(&mut self) -> Chain {
        self.len = 0;
        Chain {
            next: self.head.take(),
        }
    }

    /// The scheduled drain job has begun; later frees need a new request
    pub fn job_started(&mut self) {
        self.drain_requested = false;
    }

    /// Whether a drain job has been requested and not yet started
    pub fn drain_requested(&self) -> bool {
        self.drain_requested
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Deepest the queue has been
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Drop queued records without aggregating them
    pub fn clear(&mut self, interner: &mut PathInterner) {
        for mut record in self.take_chain() {
            if let Some(path) = record.path.take() {
                interner.release(path);
            }
        }
    }
}

impl Drop for FreeQueue {
    fn drop(&mut self) {
        drop(self.take_chain());
    }
}

/// Detached list of freed records, yielded head first
pub struct Chain {
    next: Option<Box<AllocationRecord>>,
}

impl Iterator for Chain {
    type Item = Box<AllocationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = self.next.take()?;
        self.next = record.next.take();
        Some(record)
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        // unlink one at a time; a long list must not drop recursively
        for _ in self.by_ref() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectId;

    fn record(id: u64) -> Box<AllocationRecord> {
        let mut record = Box::new(AllocationRecord::blank());
        record.object = ObjectId(id);
        record
    }

    #[test]
    fn test_first_push_requests_drain() {
        let mut queue = FreeQueue::new();
        assert!(queue.push(record(1)));
        assert!(!queue.push(record(2)));
        assert!(!queue.push(record(3)));
        assert_eq!(queue.len(), 3);
        assert!(queue.drain_requested());
    }

    #[test]
    fn test_request_outlives_synchronous_take() {
        let mut queue = FreeQueue::new();
        assert!(queue.push(record(1)));
        assert_eq!(queue.take_chain().count(), 1);

        // the scheduled job has not run yet, so no second request
        assert!(!queue.push(record(2)));

        queue.job_started();
        assert_eq!(queue.take_chain().count(), 1);
        assert!(queue.push(record(3)));
    }

    #[test]
    fn test_chain_is_lifo_and_marks_freed() {
        let mut queue = FreeQueue::new();
        for id in 0..4 {
            queue.push(record(id));
        }
        let chain: Vec<_> = queue.take_chain().collect();
        let ids: Vec<_> = chain.iter().map(|r| r.object.0).collect();
        assert_eq!(ids, vec![3, 2, 1, 0]);
        assert!(chain.iter().all(|r| r.liveness == Liveness::Freed && r.next.is_none()));
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.peak(), 4);
    }

    #[test]
    fn test_take_on_empty_queue() {
        let mut queue = FreeQueue::new();
        assert_eq!(queue.take_chain().count(), 0);
        assert!(!queue.drain_requested());
    }

    #[test]
    fn test_clear_releases_paths() {
        let mut paths = PathInterner::new();
        let mut queue = FreeQueue::new();
        for id in 0..3 {
            let mut r = record(id);
            r.path = Some(paths.intern("q.rb"));
            queue.push(r);
        }
        queue.clear(&mut paths);
        assert!(paths.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_long_queue_drops_without_overflow() {
        let mut queue = FreeQueue::new();
        for id in 0..200_000 {
            queue.push(record(id));
        }
        drop(queue);
    }
}
