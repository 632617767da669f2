//! alloctrace-util - Foundation Types for the Allocation Tracer
//!
//! ============================================================================
//! MODULE OVERVIEW
//! ============================================================================
//!
//! Small, allocation-conscious building blocks shared by the tracing engine:
//!
//! 1. TYPED INDICES
//!    [`index_vec::IndexVec`] is a `Vec` addressed by a newtype index. It
//!    backs the interner's slots and the engine's per-type counter and
//!    histogram rows, so an index from one table can never be used against
//!    another. [`impl_idx!`] derives the index trait for a `u32` newtype.
//!
//! 2. REFERENCE-COUNTED INTERNING
//!    [`interner::PathInterner`] keeps exactly one canonical copy of every
//!    distinct source path that is still referenced. Callers hold a
//!    [`interner::PathId`] (4 bytes) instead of the text; equality of two
//!    handles is equality of the text, by construction.
//!
//! ```text
//! PathInterner
//! ┌──────────────────────────────┐      slots (IndexVec<PathId, Slot>)
//! │ lookup: "app.rb" -> PathId(0)│ ───► ┌────┬──────────────┬──────┐
//! │         "lib.rb" -> PathId(1)│      │ 0  │ Arc("app.rb")│ rc=3 │
//! └──────────────────────────────┘      │ 1  │ Arc("lib.rb")│ rc=1 │
//!                                       │ 2  │ (vacant)     │      │
//!                                       └────┴──────────────┴──────┘
//! ```
//!
//! Vacant slots are reused, so handle values stay small for the lifetime of
//! a tracing session.

pub mod error;
pub mod index_vec;
pub mod interner;

pub use error::{InternerError, InternerResult};
pub use index_vec::{Idx, IndexVec};
pub use interner::{InternerStats, PathId, PathInterner};
