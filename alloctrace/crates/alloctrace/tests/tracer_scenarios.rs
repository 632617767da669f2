//! Tracer Scenario Tests - Aggregation Results End To End
//!
//! These tests drive complete sessions through a scripted host and check
//! the result view:
//! - Counts, ages and sizes across freed and living objects
//! - Composite keys in every field combination
//! - Path interning and release
//! - Age boundaries and promotion
//!
//! ============================================================================
//! EACH TEST FINDS SPECIFIC AGGREGATION BUGS - DO NOT WEAKEN ASSERTIONS
//! ============================================================================

mod common;

use alloctrace::{KeyValue, LiveRefresh, ObjectId, OwnerType, TracerError, TracerState};
use common::{TracerFixture, T_ARRAY, T_OBJECT, T_STRING};

/// ============================================================================
/// AGGREGATION BY TYPE
/// ============================================================================

/// Three objects allocated at epoch 0, two freed at epoch 2
///
/// **Bug this finds:** live objects missing from the result, bytes counted
/// for living objects, ages measured from the wrong epoch
/// **Invariant verified:** result = freed aggregates + live aggregation
#[test]
fn test_freed_and_live_objects_share_a_row() {
    // Arrange
    let mut fx = TracerFixture::running(&["type"]);
    for id in 1..=3 {
        fx.alloc_at(id, T_STRING, "app.rb", 10);
    }

    // Act
    fx.gc(2);
    fx.free(1, T_STRING, 40);
    fx.free(2, T_STRING, 40);
    let result = fx.result();

    // Assert
    assert_eq!(result.len(), 1, "one type means one row");
    let value = result
        .get(&[KeyValue::Type(T_STRING)])
        .expect("row for T_STRING");
    assert_eq!(value.count, 3);
    assert_eq!(value.total_age, 6);
    assert_eq!(value.min_age, 2);
    assert_eq!(value.max_age, 2);
    assert_eq!(value.total_bytes, 80, "living objects contribute no bytes");
    assert_eq!(value.promoted_count, 0);
    assert_eq!(result.live_objects(), 1);
    assert_eq!(result.epoch(), 2);
}

/// Distinct types land in distinct rows
///
/// **Bug this finds:** type tag dropped from the key
#[test]
fn test_rows_split_by_type() {
    let mut fx = TracerFixture::running(&["type"]);
    fx.alloc(1, T_STRING);
    fx.alloc(2, T_ARRAY);
    fx.alloc(3, T_ARRAY);

    let result = fx.result();

    assert_eq!(result.len(), 2);
    assert_eq!(result.get(&[KeyValue::Type(T_STRING)]).map(|v| v.count), Some(1));
    assert_eq!(result.get(&[KeyValue::Type(T_ARRAY)]).map(|v| v.count), Some(2));
    assert_eq!(result.total_count(), 3);
}

/// ============================================================================
/// KEY LAYOUTS
/// ============================================================================

/// Default key is `[path, line]`
///
/// **Bug this finds:** default layout not applied when `setup` is never called
#[test]
fn test_default_key_is_path_and_line() {
    let mut fx = TracerFixture::idle();
    fx.tracer.start().unwrap();
    fx.alloc_at(1, T_OBJECT, "a.rb", 3);
    fx.alloc_at(2, T_OBJECT, "a.rb", 3);
    fx.alloc_at(3, T_OBJECT, "a.rb", 4);

    let result = fx.result();

    assert_eq!(
        result.header(),
        vec!["path", "line", "count", "old_count", "total_age", "min_age", "max_age", "total_memsize"]
    );
    assert_eq!(
        result.get(&[KeyValue::path("a.rb"), KeyValue::Line(3)]).map(|v| v.count),
        Some(2)
    );
    assert_eq!(
        result.get(&[KeyValue::path("a.rb"), KeyValue::Line(4)]).map(|v| v.count),
        Some(1)
    );
}

/// Header order is canonical regardless of `setup` order
///
/// **Bug this finds:** key fields emitted in request order instead of
/// path, line, type, class
#[test]
fn test_header_uses_canonical_order() {
    let mut fx = TracerFixture::idle();
    fx.tracer.setup(&["class", "type", "path"]).unwrap();

    assert_eq!(
        fx.tracer.header(),
        vec![
            "path",
            "type",
            "class",
            "count",
            "old_count",
            "total_age",
            "min_age",
            "max_age",
            "total_memsize"
        ]
    );
}

/// Every key field at once
///
/// **Bug this finds:** owner or line lost when all four fields are keyed
#[test]
fn test_all_key_fields() {
    let mut fx = TracerFixture::running(&["path", "line", "type", "class"]);
    fx.tracer.on_allocate(
        alloctrace::AllocationEvent::new(ObjectId(1), T_OBJECT)
            .at("model.rb", 22)
            .owned_by(OwnerType(0x40)),
    );

    let result = fx.result();
    let (key, value) = result.iter().next().expect("one row");

    assert_eq!(key.path(), Some("model.rb"));
    assert_eq!(key.line(), Some(22));
    assert_eq!(key.type_tag(), Some(T_OBJECT));
    assert_eq!(key.owner(), Some(OwnerType(0x40)));
    assert_eq!(value.count, 1);
}

/// Objects allocated without a source location share the empty-path row
///
/// **Bug this finds:** missing path treated as an interned empty string
#[test]
fn test_missing_path() {
    let mut fx = TracerFixture::running(&["path"]);
    fx.alloc(1, T_OBJECT);
    fx.alloc(2, T_OBJECT);

    let result = fx.result();

    assert_eq!(result.get(&[KeyValue::Path(None)]).map(|v| v.count), Some(2));
    assert_eq!(fx.tracer.stats().interned_paths, 0);
}

/// ============================================================================
/// AGES
/// ============================================================================

/// Object freed in the epoch it was allocated in
///
/// **Bug this finds:** off-by-one age, min_age seeded with 0 instead of the
/// first sample
#[test]
fn test_age_zero_boundary() {
    let mut fx = TracerFixture::running(&["type"]);
    fx.gc(5);
    fx.alloc(1, T_ARRAY);
    fx.free(1, T_ARRAY, 24);

    let value = *fx.result().get(&[KeyValue::Type(T_ARRAY)]).unwrap();

    assert_eq!(value.count, 1);
    assert_eq!(value.min_age, 0);
    assert_eq!(value.max_age, 0);
    assert_eq!(value.total_bytes, 24);
}

/// min and max track the extremes across a key
///
/// **Bug this finds:** min_age starting at 0 so it never rises
#[test]
fn test_min_max_ages() {
    let mut fx = TracerFixture::running(&["type"]);
    fx.alloc(1, T_OBJECT);
    fx.gc(3);
    fx.alloc(2, T_OBJECT);
    fx.gc(1);
    fx.free(1, T_OBJECT, 8);
    fx.free(2, T_OBJECT, 8);

    let value = *fx.result().get(&[KeyValue::Type(T_OBJECT)]).unwrap();

    assert_eq!(value.min_age, 1);
    assert_eq!(value.max_age, 4);
    assert_eq!(value.total_age, 5);
    assert!((value.average_age() - 2.5).abs() < f64::EPSILON);
}

/// Promotion is read from the host at free time
///
/// **Bug this finds:** old_count never incremented
#[test]
fn test_promoted_objects_counted_as_old() {
    let mut fx = TracerFixture::running(&["type"]);
    fx.alloc(1, T_STRING);
    fx.alloc(2, T_STRING);
    fx.gc(1);
    fx.tracer.host_mut().mark_promoted(ObjectId(1));
    fx.free(1, T_STRING, 40);
    fx.free(2, T_STRING, 40);

    let value = *fx.result().get(&[KeyValue::Type(T_STRING)]).unwrap();
    assert_eq!(value.promoted_count, 1);
    assert_eq!(value.count, 2);
}

/// ============================================================================
/// MERGING
/// ============================================================================

/// Freed and live contributions to one key combine field-wise
///
/// **Bug this finds:** merge overwriting instead of combining, min/max
/// taken from only one side
#[test]
fn test_merge_of_freed_and_live() {
    let mut fx = TracerFixture::running(&["path"]);
    fx.alloc_at(1, T_OBJECT, "a.rb", 1);
    fx.alloc_at(2, T_OBJECT, "a.rb", 2);
    fx.free(1, T_OBJECT, 16);
    fx.safepoint();
    fx.gc(7);

    let value = *fx.result().get(&[KeyValue::path("a.rb")]).unwrap();

    assert_eq!(value.count, 2);
    assert_eq!(value.min_age, 0, "freed at epoch 0");
    assert_eq!(value.max_age, 7, "still alive at epoch 7");
    assert_eq!(value.total_age, 7);
    assert_eq!(value.total_bytes, 16);
}

/// Taking a result does not fold live objects into the stored aggregates
///
/// **Bug this finds:** transient aggregation leaking into persistent state,
/// so repeated results double count
#[test]
fn test_result_is_idempotent() {
    let mut fx = TracerFixture::running(&["type"]);
    fx.alloc(1, T_STRING);
    fx.alloc(2, T_STRING);
    fx.free(1, T_STRING, 40);

    let first = fx.result();
    let second = fx.result();

    assert_eq!(first, second);
    assert_eq!(first.total_count(), 2);
    assert_eq!(fx.tracer.stats().aggregate_keys, 1);
}

/// The host's current owner replaces the captured one for living objects
///
/// **Bug this finds:** refresh ignored, or applied when the type changed
#[test]
fn test_live_refresh_updates_owner() {
    let mut fx = TracerFixture::running(&["class"]);
    fx.alloc_owned(1, T_OBJECT, 0x10);
    fx.alloc_owned(2, T_OBJECT, 0x10);
    fx.tracer.host_mut().set_refresh(
        ObjectId(1),
        LiveRefresh {
            type_tag: T_OBJECT,
            owner: Some(OwnerType(0x20)),
        },
    );
    fx.tracer.host_mut().set_refresh(
        ObjectId(2),
        LiveRefresh {
            type_tag: T_STRING,
            owner: Some(OwnerType(0x30)),
        },
    );

    let result = fx.result();

    assert_eq!(
        result.get(&[KeyValue::Class(Some(OwnerType(0x20)))]).map(|v| v.count),
        Some(1)
    );
    assert_eq!(
        result.get(&[KeyValue::Class(Some(OwnerType(0x10)))]).map(|v| v.count),
        Some(1),
        "type changed, captured owner kept"
    );
}

/// ============================================================================
/// PATH INTERNING
/// ============================================================================

/// Two objects from one file share one interned path
///
/// **Bug this finds:** duplicate path copies, paths leaked after stop
/// **Invariant verified:** the interner is empty once a session ends
#[test]
fn test_shared_path_interned_once_and_released() {
    let mut fx = TracerFixture::running(&["path", "line"]);
    fx.alloc_at(1, T_STRING, "shared.rb", 1);
    fx.alloc_at(2, T_STRING, "shared.rb", 2);

    let stats = fx.tracer.stats();
    assert_eq!(stats.interned_paths, 1);
    assert_eq!(stats.interner_hits, 1);

    fx.free(1, T_STRING, 40);
    fx.safepoint();
    assert_eq!(fx.tracer.stats().interned_paths, 1, "aggregate key holds it");

    fx.tracer.stop().unwrap();
    assert_eq!(fx.tracer.stats().interned_paths, 0);
}

/// Reusing an object id drops the old record's path reference
///
/// **Bug this finds:** stale path released before the new one is interned,
/// freeing a text that is still needed
#[test]
fn test_reallocation_replaces_record() {
    let mut fx = TracerFixture::running(&["path"]);
    fx.alloc_at(1, T_STRING, "a.rb", 1);
    fx.alloc_at(1, T_STRING, "a.rb", 9);
    fx.alloc_at(1, T_STRING, "b.rb", 2);

    let stats = fx.tracer.stats();
    assert_eq!(stats.reallocations, 2);
    assert_eq!(stats.interned_paths, 1, "a.rb released, b.rb kept");

    let result = fx.result();
    assert_eq!(result.len(), 1);
    assert_eq!(result.get(&[KeyValue::path("b.rb")]).map(|v| v.count), Some(1));
}

/// ============================================================================
/// CONFIGURATION
/// ============================================================================

/// `setup` while running fails and keeps the old layout
///
/// **Bug this finds:** key layout swapped under a populated aggregator
#[test]
fn test_setup_while_running_rejected() {
    let mut fx = TracerFixture::running(&["type"]);

    let err = fx.tracer.setup(&["path"]).unwrap_err();

    assert!(matches!(
        err,
        TracerError::InvalidState {
            operation: "setup",
            state: TracerState::Running
        }
    ));
    assert_eq!(fx.tracer.header()[0], "type");
}

/// Unknown key names are rejected and the old layout kept
///
/// **Bug this finds:** partial layout applied before the bad name is seen
#[test]
fn test_setup_unknown_field() {
    let mut fx = TracerFixture::idle();
    fx.tracer.setup(&["type"]).unwrap();

    let err = fx.tracer.setup(&["path", "file"]).unwrap_err();

    assert!(matches!(err, TracerError::UnknownField(ref name) if name == "file"));
    assert_eq!(fx.tracer.header()[0], "type");
}

/// An empty list restores the default layout
#[test]
fn test_setup_empty_restores_default() {
    let mut fx = TracerFixture::idle();
    fx.tracer.setup(&["class"]).unwrap();
    fx.tracer.setup::<&str>(&[]).unwrap();

    assert_eq!(&fx.tracer.header()[..2], &["path", "line"]);
}
