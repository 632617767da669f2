//! Stats Module - tracer activity counters
//!
//! Counts what the hooks and the drain job have done since the tracer was
//! created. These describe the tracer's own work, not the traced program;
//! `clear()` does not reset them.

use serde::Serialize;

/// Activity counters maintained by the hooks and the drain job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Activity {
    pub allocations: u64,
    pub paused_allocations: u64,
    pub reallocations: u64,
    pub frees: u64,
    pub untracked_frees: u64,
    pub ignored_events: u64,
    pub drains: u64,
    pub records_folded: u64,
    pub snapshots: u64,
}

/// Point-in-time view of the tracer's activity
///
/// # Examples
///
/// ```
/// use alloctrace::{ScriptedHost, Tracer, TracerConfig};
///
/// let tracer = Tracer::new(ScriptedHost::new(), TracerConfig::default()).unwrap();
/// let stats = tracer.stats();
/// assert_eq!(stats.allocations, 0);
/// assert_eq!(stats.fold_ratio(), 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TracerStats {
    /// Allocation events that created or reused a live record
    pub allocations: u64,
    /// Allocation events seen while paused (counted, not recorded)
    pub paused_allocations: u64,
    /// Allocations that found their identity already tracked
    pub reallocations: u64,
    /// Free events that matched a live record
    pub frees: u64,
    /// Free events for objects never seen allocated
    pub untracked_frees: u64,
    /// Events delivered while idle
    pub ignored_events: u64,
    /// Drains that folded at least one record
    pub drains: u64,
    /// Freed records folded into the aggregates
    pub records_folded: u64,
    /// Result views built
    pub snapshots: u64,
    /// Deepest the free queue has been
    pub peak_queue_depth: usize,
    /// Records currently in the live table
    pub live_objects: usize,
    /// Distinct aggregate keys stored
    pub aggregate_keys: usize,
    /// Allocations served from the record pool
    pub pool_hits: u64,
    /// Allocations that needed a fresh record
    pub pool_misses: u64,
    /// Distinct paths currently interned
    pub interned_paths: usize,
    pub interner_hits: usize,
    pub interner_misses: usize,
}

impl TracerStats {
    /// Fraction of matched frees that have already been folded
    pub fn fold_ratio(&self) -> f64 {
        if self.frees == 0 {
            0.0
        } else {
            self.records_folded as f64 / self.frees as f64
        }
    }

    /// Fraction of allocations served from the record pool
    pub fn pool_hit_rate(&self) -> f64 {
        let total = self.pool_hits + self.pool_misses;
        if total == 0 {
            0.0
        } else {
            self.pool_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios() {
        let stats = TracerStats {
            frees: 4,
            records_folded: 3,
            pool_hits: 1,
            pool_misses: 3,
            ..TracerStats::default()
        };
        assert!((stats.fold_ratio() - 0.75).abs() < f64::EPSILON);
        assert!((stats.pool_hit_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serializes() {
        let json = serde_json::to_value(TracerStats::default()).unwrap();
        assert_eq!(json["records_folded"], 0);
    }
}
