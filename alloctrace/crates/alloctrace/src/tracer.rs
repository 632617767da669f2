//! Tracer engine and session state machine
//!
//! [`Tracer`] owns every table the engine keeps and is driven from four
//! directions:
//!
//! 1. The host's allocation and free hooks ([`Tracer::on_allocate`],
//!    [`Tracer::on_free`]). These only touch the live table, the per-type
//!    counters and the free queue.
//! 2. The host's deferred job ([`Tracer::run_deferred_drain`]), which folds
//!    queued frees into the aggregates at a safe point.
//! 3. Caller operations: `setup`, `start`, `stop`, `pause`, `resume`,
//!    `result`, `clear` and the histogram and counter readers.
//! 4. [`Tracer::trace`], which scopes a session around a unit of work.
//!
//! # State Transitions
//!
//! ```text
//!            start / trace              pause
//!   Idle ─────────────────▶ Running ───────────▶ Paused
//!    ▲                        │  ▲                  │
//!    │         stop           │  └──── resume ──────┘
//!    └────────────────────────┴──────── stop ───────┘
//! ```
//!
//! The engine does no locking of its own. A host that delivers events from
//! several threads serializes them through [`SharedTracer`](crate::sync::SharedTracer).

use std::fmt;

use alloctrace_util::PathInterner;

use crate::aggregate::{AgeSample, Aggregator, KeyLayout};
use crate::config::TracerConfig;
use crate::counters::{TypeCounters, TypeCounts};
use crate::deferred::FreeQueue;
use crate::error::{Result, TracerError};
use crate::host::{Host, HookKind};
use crate::invariant;
use crate::lifetime::LifetimeTable;
use crate::live::LiveTable;
use crate::logging::{EventLog, TracerEvent};
use crate::object::{AllocationEvent, FreeEvent};
use crate::snapshot::{header_for, Snapshot};
use crate::stats::{Activity, TracerStats};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    /// No hooks installed; configuration may change
    Idle,
    /// Both hooks enabled
    Running,
    /// Allocation hook disabled, free hook still enabled
    Paused,
}

impl fmt::Display for TracerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TracerState::Idle => "idle",
            TracerState::Running => "running",
            TracerState::Paused => "paused",
        })
    }
}

/// Output of [`Tracer::trace`]
#[derive(Debug)]
pub struct Traced<T> {
    /// What the work returned
    pub value: T,
    /// Final result view taken as the session stopped
    pub snapshot: Snapshot,
}

/// Allocation tracing and aggregation engine
pub struct Tracer<H: Host> {
    host: H,
    config: TracerConfig,
    state: TracerState,
    interner: PathInterner,
    live: LiveTable,
    queue: FreeQueue,
    aggregates: Aggregator,
    lifetime: Option<LifetimeTable>,
    counters: TypeCounters,
    activity: Activity,
    log: EventLog,
}

impl<H: Host> Tracer<H> {
    /// Create an idle tracer
    ///
    /// # Errors
    ///
    /// [`TracerError::Configuration`] if `config` fails validation.
    pub fn new(host: H, config: TracerConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            host,
            state: TracerState::Idle,
            interner: PathInterner::new(),
            live: LiveTable::new(config.live_capacity, config.record_pool_limit),
            queue: FreeQueue::new(),
            aggregates: Aggregator::new(config.keys),
            lifetime: None,
            counters: TypeCounters::with_hint(config.type_tag_hint),
            activity: Activity::default(),
            log: EventLog::new(config.event_log.clone()),
            config,
        })
    }

    pub fn state(&self) -> TracerState {
        self.state
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Choose the aggregate key fields
    ///
    /// Accepts any subset of `path`, `line`, `type`, `class` in any order;
    /// keys always use canonical order. An empty list restores the default
    /// `[path, line]`.
    ///
    /// # Errors
    ///
    /// - [`TracerError::InvalidState`] unless idle
    /// - [`TracerError::UnknownField`] for an unrecognized name
    ///
    /// The previous layout is kept on error.
    pub fn setup<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        self.require_idle("setup")?;
        let layout = KeyLayout::parse(fields)?;

        self.config.keys = layout;
        self.aggregates.set_layout(layout);
        self.log.log(TracerEvent::Reconfigured {
            keys: layout.to_string(),
            lifetime: self.config.lifetime_histogram,
        });
        Ok(())
    }

    /// Switch lifetime histogram collection for the next session
    ///
    /// Disabling also discards any histogram kept from the last session.
    ///
    /// # Errors
    ///
    /// [`TracerError::InvalidState`] unless idle.
    pub fn enable_lifetime_histogram(&mut self, enabled: bool) -> Result<()> {
        self.require_idle("change the lifetime histogram")?;

        self.config.lifetime_histogram = enabled;
        if !enabled {
            self.lifetime = None;
        }
        self.log.log(TracerEvent::Reconfigured {
            keys: self.config.keys.to_string(),
            lifetime: enabled,
        });
        Ok(())
    }

    /// Ordered names of the key fields followed by the value fields
    pub fn header(&self) -> Vec<&'static str> {
        header_for(self.config.keys)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Install the hooks and begin a session
    ///
    /// # Errors
    ///
    /// [`TracerError::AlreadyRunning`] unless idle.
    pub fn start(&mut self) -> Result<()> {
        if self.state != TracerState::Idle {
            return Err(TracerError::AlreadyRunning);
        }

        self.lifetime = self
            .config
            .lifetime_histogram
            .then(LifetimeTable::new);
        self.host.set_hook(HookKind::Allocation, true);
        self.host.set_hook(HookKind::Free, true);
        self.state = TracerState::Running;

        self.log.log(TracerEvent::Started {
            keys: self.config.keys.to_string(),
            lifetime: self.config.lifetime_histogram,
        });
        Ok(())
    }

    /// End the session, returning its final result view
    ///
    /// Pending frees are folded first. The live table, free queue, aggregates
    /// and interned paths are released; per-type counters and the lifetime
    /// histogram stay readable until the next `start` or `clear`.
    ///
    /// # Errors
    ///
    /// [`TracerError::NotStarted`] when idle.
    pub fn stop(&mut self) -> Result<Snapshot> {
        self.require_active()?;
        Ok(self.finish_session())
    }

    /// Disable the allocation hook; frees keep being tracked
    ///
    /// # Errors
    ///
    /// - [`TracerError::NotStarted`] when idle
    /// - [`TracerError::HookAlreadyDisabled`] when already paused
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            TracerState::Idle => Err(TracerError::NotStarted),
            TracerState::Paused => Err(TracerError::HookAlreadyDisabled),
            TracerState::Running => {
                self.host.set_hook(HookKind::Allocation, false);
                self.state = TracerState::Paused;
                self.log.log(TracerEvent::Paused {
                    live: self.live.len(),
                });
                Ok(())
            },
        }
    }

    /// Re-enable the allocation hook
    ///
    /// # Errors
    ///
    /// - [`TracerError::NotStarted`] when idle
    /// - [`TracerError::HookAlreadyEnabled`] when already running
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            TracerState::Idle => Err(TracerError::NotStarted),
            TracerState::Running => Err(TracerError::HookAlreadyEnabled),
            TracerState::Paused => {
                self.host.set_hook(HookKind::Allocation, true);
                self.state = TracerState::Running;
                self.log.log(TracerEvent::Resumed {
                    live: self.live.len(),
                });
                Ok(())
            },
        }
    }

    /// Run `work` inside a session
    ///
    /// The tracer is started before `work` runs and is back in `Idle` when
    /// this returns, whether `work` succeeded, failed, or panicked. If `work`
    /// stops the session itself, the returned view is empty; the view that
    /// `stop` returned inside `work` is the real one.
    ///
    /// # Errors
    ///
    /// - [`TracerError::AlreadyRunning`] if a session is already active
    /// - [`TracerError::Work`] if `work` failed; it carries the final view
    ///
    /// # Examples
    ///
    /// ```
    /// use alloctrace::{AllocationEvent, ObjectId, ScriptedHost, Tracer, TracerConfig, TypeTag};
    ///
    /// let mut tracer = Tracer::new(ScriptedHost::new(), TracerConfig::default()).unwrap();
    /// let traced = tracer
    ///     .trace(|t| {
    ///         t.on_allocate(AllocationEvent::new(ObjectId(1), TypeTag(0)).at("app.rb", 3));
    ///         Ok(42)
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(traced.value, 42);
    /// assert_eq!(traced.snapshot.total_count(), 1);
    /// ```
    pub fn trace<T, F>(&mut self, work: F) -> Result<Traced<T>>
    where
        F: FnOnce(&mut Self) -> anyhow::Result<T>,
    {
        self.start()?;
        let mut guard = SessionGuard {
            tracer: self,
            armed: true,
        };

        let outcome = work(&mut *guard.tracer);
        let snapshot = guard.finish();
        match outcome {
            Ok(value) => Ok(Traced { value, snapshot }),
            Err(source) => Err(TracerError::Work {
                source,
                snapshot: Box::new(snapshot),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Result view of the current session without stopping it
    ///
    /// Pending frees are folded first; the live population is aggregated
    /// into a transient table that is merged into the view and discarded.
    ///
    /// # Errors
    ///
    /// [`TracerError::NotStarted`] when idle.
    pub fn result(&mut self) -> Result<Snapshot> {
        self.require_active()?;
        self.drain_pending();
        Ok(self.build_snapshot())
    }

    /// Reset all aggregation state
    ///
    /// Live records, queued frees, aggregates, per-type counters and the
    /// lifetime histogram are discarded. The session state and configuration
    /// are unchanged.
    pub fn clear(&mut self) {
        self.release_tables();
        self.counters.reset();
        if let Some(lifetime) = self.lifetime.as_mut() {
            lifetime.clear();
        }
        self.log.log(TracerEvent::Cleared);
    }

    /// Freed-object lifetime histogram, with pending frees folded in
    ///
    /// `None` when collection is disabled.
    pub fn lifetime_histogram(&mut self) -> Option<&LifetimeTable> {
        self.drain_pending();
        self.lifetime.as_ref()
    }

    /// Hand the freed-object histogram to the caller and stop collecting it
    ///
    /// A second call returns `None` until collection is re-enabled.
    pub fn take_lifetime_histogram(&mut self) -> Option<LifetimeTable> {
        self.drain_pending();
        let table = self.lifetime.take()?;
        self.config.lifetime_histogram = false;
        Some(table)
    }

    /// Fresh histogram of the current ages of living objects
    ///
    /// Never merged into the freed-object histogram.
    pub fn live_lifetime_histogram(&self) -> LifetimeTable {
        let epoch = self.host.current_epoch();
        let mut table = LifetimeTable::new();
        for record in self.live.records() {
            table.record(record.type_tag, record.age_at(epoch));
        }
        table
    }

    /// Objects allocated, by type tag
    pub fn allocated_count_by_type(&self) -> TypeCounts {
        self.counters.allocated().clone()
    }

    /// Objects freed, by type tag
    pub fn freed_count_by_type(&self) -> TypeCounts {
        self.counters.freed().clone()
    }

    /// Number of objects currently tracked as alive
    pub fn live_objects(&self) -> usize {
        self.live.len()
    }

    /// Number of freed records waiting for a drain
    pub fn pending_frees(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> TracerStats {
        let pool = self.live.pool_stats();
        let interner = self.interner.stats();
        TracerStats {
            allocations: self.activity.allocations,
            paused_allocations: self.activity.paused_allocations,
            reallocations: self.activity.reallocations,
            frees: self.activity.frees,
            untracked_frees: self.activity.untracked_frees,
            ignored_events: self.activity.ignored_events,
            drains: self.activity.drains,
            records_folded: self.activity.records_folded,
            snapshots: self.activity.snapshots,
            peak_queue_depth: self.queue.peak(),
            live_objects: self.live.len(),
            aggregate_keys: self.aggregates.len(),
            pool_hits: pool.hits,
            pool_misses: pool.misses,
            interned_paths: interner.count,
            interner_hits: interner.hits,
            interner_misses: interner.misses,
        }
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    // ------------------------------------------------------------------
    // Host entry points
    // ------------------------------------------------------------------

    /// Allocation hook
    ///
    /// Never fails. Ignored while idle; while paused the allocation is
    /// counted but not tracked.
    pub fn on_allocate(&mut self, event: AllocationEvent<'_>) {
        match self.state {
            TracerState::Idle => {
                self.activity.ignored_events += 1;
                return;
            },
            TracerState::Paused => {
                self.counters.count_allocated(event.type_tag);
                self.activity.paused_allocations += 1;
                return;
            },
            TracerState::Running => {},
        }

        self.counters.count_allocated(event.type_tag);

        // intern before releasing the previous occupant's path so a shared
        // text keeps its canonical copy
        let path = event.path.map(|text| self.interner.intern(text));
        let epoch = self.host.current_epoch();
        let placement = self.live.record_allocation(&event, path, epoch);
        if let Some(stale) = placement.stale_path {
            self.interner.release(stale);
        }
        if placement.replaced {
            self.activity.reallocations += 1;
        }
        self.activity.allocations += 1;

        log::trace!(
            "allocate {:?} type {} at epoch {}",
            event.object,
            event.type_tag,
            epoch
        );
    }

    /// Free hook
    ///
    /// Never fails. A free for an object that was never seen allocated only
    /// bumps the freed counter.
    pub fn on_free(&mut self, event: FreeEvent) {
        if self.state == TracerState::Idle {
            self.activity.ignored_events += 1;
            return;
        }

        self.counters.count_freed(event.type_tag);

        let Some(mut record) = self.live.remove(event.object) else {
            self.activity.untracked_frees += 1;
            return;
        };
        record.type_tag = event.type_tag;
        record.byte_size = event.byte_size;
        record.promoted = self.host.survived_collection(event.object);
        self.activity.frees += 1;

        if self.queue.push(record) {
            self.host.schedule_drain();
        }

        log::trace!("free {:?} queued ({} pending)", event.object, self.queue.len());
    }

    /// Deferred drain job, run by the host at a safe point
    ///
    /// Returns the number of records folded.
    pub fn run_deferred_drain(&mut self) -> usize {
        self.queue.job_started();
        self.drain_pending()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn drain_pending(&mut self) -> usize {
        if self.queue.is_empty() {
            return 0;
        }

        let epoch = self.host.current_epoch();
        let mut folded = 0;
        for mut record in self.queue.take_chain() {
            let sample = AgeSample::freed(&record, epoch);
            if let Some(path) = self.aggregates.fold(&sample) {
                self.interner.retain(path);
            }
            if let Some(lifetime) = self.lifetime.as_mut() {
                lifetime.record(record.type_tag, sample.age);
            }
            if let Some(path) = record.path.take() {
                self.interner.release(path);
            }
            self.live.recycle(record);
            folded += 1;
        }

        self.activity.drains += 1;
        self.activity.records_folded += folded as u64;
        self.log.log(TracerEvent::Drained {
            records: folded,
            epoch,
        });
        folded
    }

    fn build_snapshot(&mut self) -> Snapshot {
        let epoch = self.host.current_epoch();
        let mut transient = Aggregator::new(self.config.keys);
        for record in self.live.records() {
            let promoted = self.host.survived_collection(record.object);
            let refresh = self.host.refresh_live(record.object);
            // live records hold their own path references for the
            // transient table's lifetime
            transient.fold(&AgeSample::living(record, epoch, promoted, refresh));
        }

        let snapshot = Snapshot::build(
            &self.aggregates,
            &transient,
            &self.interner,
            self.live.len(),
            epoch,
        );

        self.activity.snapshots += 1;
        self.log.log(TracerEvent::Snapshot {
            rows: snapshot.len(),
            live: self.live.len(),
            epoch,
        });
        snapshot
    }

    /// Fold pending frees, take the final view and go idle
    fn finish_session(&mut self) -> Snapshot {
        self.drain_pending();
        let snapshot = self.build_snapshot();
        let live = self.live.len();
        self.teardown();

        self.log.log(TracerEvent::Stopped {
            rows: snapshot.len(),
            live,
        });
        snapshot
    }

    /// Release every record, aggregate key and interned path
    fn release_tables(&mut self) {
        self.live.clear(&mut self.interner);
        self.queue.clear(&mut self.interner);
        self.aggregates.clear(&mut self.interner);

        if !std::thread::panicking() {
            invariant!(
                self.interner.is_empty(),
                "{} paths still referenced after release",
                self.interner.len()
            );
        }
        self.interner.clear();
    }

    /// Disable the hooks, release the session's tables and go idle
    fn teardown(&mut self) {
        self.host.set_hook(HookKind::Allocation, false);
        self.host.set_hook(HookKind::Free, false);
        self.release_tables();
        self.live.shrink_pool();
        self.state = TracerState::Idle;
    }

    fn require_idle(&self, operation: &'static str) -> Result<()> {
        if self.state == TracerState::Idle {
            Ok(())
        } else {
            Err(TracerError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn require_active(&self) -> Result<()> {
        if self.state == TracerState::Idle {
            Err(TracerError::NotStarted)
        } else {
            Ok(())
        }
    }
}

impl<H: Host> Drop for Tracer<H> {
    fn drop(&mut self) {
        if self.state != TracerState::Idle {
            self.host.set_hook(HookKind::Allocation, false);
            self.host.set_hook(HookKind::Free, false);
        }
    }
}

impl<H: Host> fmt::Debug for Tracer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("state", &self.state)
            .field("keys", &self.config.keys)
            .field("live", &self.live.len())
            .field("pending", &self.queue.len())
            .field("aggregates", &self.aggregates.len())
            .finish()
    }
}

/// Returns the tracer to `Idle` unless the session was finished normally
struct SessionGuard<'a, H: Host> {
    tracer: &'a mut Tracer<H>,
    armed: bool,
}

impl<H: Host> SessionGuard<'_, H> {
    fn finish(mut self) -> Snapshot {
        self.armed = false;
        if self.tracer.state == TracerState::Idle {
            log::debug!("traced work stopped its own session");
            return Snapshot::empty(self.tracer.config.keys, self.tracer.host.current_epoch());
        }
        self.tracer.finish_session()
    }
}

impl<H: Host> Drop for SessionGuard<'_, H> {
    fn drop(&mut self) {
        if self.armed && self.tracer.state != TracerState::Idle {
            log::debug!("traced work did not complete; abandoning session");
            self.tracer.teardown();
        }
    }
}
