//! Test Utilities for the tracer test suites
//!
//! Every fixture drives a [`Tracer`] over a [`ScriptedHost`], so epochs,
//! promotion and drain jobs are fully deterministic.

#![allow(dead_code)]

use alloctrace::{
    AllocationEvent, FreeEvent, Host, ObjectId, OwnerType, ScriptedHost, Snapshot, Tracer,
    TracerConfig, TypeTag,
};

/// Type tags used across the suites
pub const T_OBJECT: TypeTag = TypeTag(1);
pub const T_STRING: TypeTag = TypeTag(5);
pub const T_ARRAY: TypeTag = TypeTag(7);

/// ============================================================================
/// TRACER FIXTURE
/// ============================================================================

/// Test fixture wrapping a tracer and its scripted host
pub struct TracerFixture {
    pub tracer: Tracer<ScriptedHost>,
}

impl TracerFixture {
    /// Idle tracer with default configuration
    ///
    /// **Bug this finds:** default configuration failing its own validation
    pub fn idle() -> Self {
        Self::with_config(TracerConfig::default())
    }

    /// Idle tracer with a custom configuration
    pub fn with_config(config: TracerConfig) -> Self {
        let tracer = Tracer::new(ScriptedHost::new(), config)
            .expect("tracer initialization should succeed with a valid config");
        Self { tracer }
    }

    /// Running tracer keyed by the given fields
    ///
    /// **Bug this finds:** `setup` rejecting valid names, `start` failing from idle
    pub fn running(fields: &[&str]) -> Self {
        let mut fixture = Self::idle();
        fixture.tracer.setup(fields).expect("setup should accept known fields");
        fixture.tracer.start().expect("start from idle should succeed");
        fixture
    }

    /// Running tracer with the lifetime histogram enabled
    pub fn running_with_lifetime(fields: &[&str]) -> Self {
        let mut fixture = Self::idle();
        fixture.tracer.setup(fields).expect("setup should accept known fields");
        fixture
            .tracer
            .enable_lifetime_histogram(true)
            .expect("histogram can be enabled while idle");
        fixture.tracer.start().expect("start from idle should succeed");
        fixture
    }

    pub fn alloc(&mut self, id: u64, type_tag: TypeTag) {
        self.tracer
            .on_allocate(AllocationEvent::new(ObjectId(id), type_tag));
    }

    pub fn alloc_at(&mut self, id: u64, type_tag: TypeTag, path: &str, line: u32) {
        self.tracer
            .on_allocate(AllocationEvent::new(ObjectId(id), type_tag).at(path, line));
    }

    pub fn alloc_owned(&mut self, id: u64, type_tag: TypeTag, owner: u64) {
        self.tracer.on_allocate(
            AllocationEvent::new(ObjectId(id), type_tag).owned_by(OwnerType(owner)),
        );
    }

    pub fn free(&mut self, id: u64, type_tag: TypeTag, bytes: u64) {
        self.tracer
            .on_free(FreeEvent::new(ObjectId(id), type_tag, bytes));
    }

    /// Complete `cycles` collections
    pub fn gc(&mut self, cycles: u64) {
        self.tracer.host_mut().advance_epoch(cycles);
    }

    /// Let the host run its pending drain job, if any
    ///
    /// Returns the number of records folded.
    pub fn safepoint(&mut self) -> usize {
        if self.tracer.host_mut().take_pending_drain() {
            self.tracer.run_deferred_drain()
        } else {
            0
        }
    }

    pub fn epoch(&self) -> u64 {
        self.tracer.host().current_epoch()
    }

    pub fn result(&mut self) -> Snapshot {
        self.tracer
            .result()
            .expect("result should succeed while a session is active")
    }
}
