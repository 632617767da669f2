//! # alloctrace - Allocation Tracing and Aggregation Engine
//!
//! alloctrace consumes the allocation and free events a managed runtime's
//! collector reports, attributes each object to its call site and type,
//! tracks how many collections it lives through, and aggregates everything
//! into compact statistics without keeping per-object records past the
//! object's death.
//!
//! ## Overview
//!
//! - **Live Allocation Table**: one record per tracked object, recycled
//!   through a bounded pool
//! - **Deferred Free Queue**: the free hook only prepends; aggregation runs
//!   later, at a host-chosen safe point
//! - **Composite-Key Aggregator**: statistics grouped by any subset of
//!   path, line, type and owning type
//! - **Path Interner**: one reference-counted canonical copy per call-site
//!   path
//! - **Lifetime Histogram**: per-type counts of objects by age at death
//! - **Snapshot Builder**: freed aggregates merged with a transient pass over
//!   the objects still alive
//!
//! ## Quick Start
//!
//! ```rust
//! use alloctrace::{AllocationEvent, FreeEvent, KeyValue, ObjectId, ScriptedHost, Tracer,
//!                  TracerConfig, TypeTag};
//!
//! fn main() -> Result<(), alloctrace::TracerError> {
//!     let mut tracer = Tracer::new(ScriptedHost::new(), TracerConfig::default())?;
//!     tracer.setup(&["type"])?;
//!     tracer.start()?;
//!
//!     let string = TypeTag(5);
//!     for id in 0..3 {
//!         tracer.on_allocate(AllocationEvent::new(ObjectId(id), string).at("app.rb", 10));
//!     }
//!
//!     // two collections later, two of them die
//!     tracer.host_mut().advance_epoch(2);
//!     tracer.on_free(FreeEvent::new(ObjectId(0), string, 40));
//!     tracer.on_free(FreeEvent::new(ObjectId(1), string, 40));
//!
//!     let result = tracer.result()?;
//!     let value = result.get(&[KeyValue::Type(string)]).copied().unwrap_or_default();
//!     assert_eq!(value.count, 3);
//!     assert_eq!(value.total_bytes, 80);
//!
//!     tracer.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   allocation hook ──▶ Live Allocation Table ──▶ per-type allocated counter
//!                              │
//!   free hook ─────────── remove ──▶ Deferred Free Queue ──(first entry)──▶ Host::schedule_drain
//!                                          │
//!   drain job / result() ◀── take chain ───┘
//!          │
//!          ├──▶ Composite-Key Aggregator (persistent)
//!          ├──▶ Lifetime Histogram
//!          └──▶ release path, recycle record
//!
//!   result() = Aggregator ∪ transient aggregation of the Live Allocation Table
//! ```
//!
//! ## Thread Safety
//!
//! A [`Tracer`] is `Send` but takes `&mut self` everywhere; it expects one
//! logical thread of control. Hosts that deliver events from several
//! threads wrap it in [`sync::SharedTracer`].
//!
//! ## Errors
//!
//! Calls made in the wrong state and invalid configuration return
//! [`TracerError`]. Broken internal invariants (such as releasing a path
//! more often than it was interned) panic.

pub mod aggregate;
pub mod config;
pub mod counters;
pub mod deferred;
pub mod error;
pub mod host;
pub mod lifetime;
pub mod live;
pub mod logging;
pub mod object;
pub mod report;
pub mod snapshot;
pub mod stats;
pub mod sync;
pub mod tracer;

pub use aggregate::{AggregateKey, AggregateValue, Aggregator, Dimension, KeyLayout};
pub use config::TracerConfig;
pub use counters::TypeCounts;
pub use error::{Result, TracerError};
pub use host::{HookKind, Host, LiveRefresh, ScriptedHost};
pub use lifetime::LifetimeTable;
pub use logging::{EventLog, EventLogConfig, LogLevel, TracerEvent};
pub use object::{AllocationEvent, FreeEvent, ObjectId, OwnerType, TypeTag};
pub use snapshot::{KeyValue, ResultKey, Snapshot};
pub use stats::TracerStats;
pub use tracer::{Traced, Tracer, TracerState};

pub use alloctrace_util::{PathId, PathInterner};

/// alloctrace version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod static_checks {
    use super::*;
    use static_assertions::{assert_impl_all, const_assert};

    assert_impl_all!(Tracer<ScriptedHost>: Send);
    assert_impl_all!(Snapshot: Send, Sync, Clone);
    assert_impl_all!(TracerError: std::error::Error, Send, Sync);
    const_assert!(std::mem::size_of::<AggregateKey>() <= 128);
    const_assert!(std::mem::size_of::<TypeTag>() == 4);
}
