//! Error Module - Tracer Error Types
//!
//! Defines the errors returned by the tracer's caller-facing operations.
//!
//! # Error Categories
//!
//! ## Sequencing Errors
//! - `AlreadyRunning` - `start`/`trace` while a session is active
//! - `NotStarted` - an operation that needs an active session in `Idle`
//! - `InvalidState` - configuration changes outside `Idle`
//! - `HookAlreadyEnabled` / `HookAlreadyDisabled` - redundant resume/pause
//!
//! ## Configuration Errors
//! - `UnknownField` - `setup` named a key field that does not exist
//! - `Configuration` - a `TracerConfig` value failed validation
//!
//! ## Work Errors
//! - `Work` - the unit of work passed to `trace` failed
//!
//! Internal-consistency violations are not represented here. They panic
//! through [`invariant!`](crate::invariant) because the tables can no longer
//! be trusted once one is detected.

use thiserror::Error;

use crate::snapshot::Snapshot;
use crate::tracer::TracerState;

/// Main error type for all tracer operations
///
/// # Examples
///
/// ```rust
/// use alloctrace::TracerError;
///
/// fn describe(err: &TracerError) -> &'static str {
///     if err.is_sequencing() {
///         "called in the wrong state"
///     } else if err.is_configuration() {
///         "bad configuration"
///     } else {
///         "work failed"
///     }
/// }
///
/// assert_eq!(describe(&TracerError::NotStarted), "called in the wrong state");
/// ```
#[derive(Debug, Error)]
pub enum TracerError {
    /// A session is already active
    ///
    /// **When returned:** `start` or `trace` while `Running` or `Paused`
    #[error("tracer is already running")]
    AlreadyRunning,

    /// No session is active
    ///
    /// **When returned:** `stop`, `pause`, `resume` or `result` while `Idle`
    #[error("tracer is not started")]
    NotStarted,

    /// Operation is only permitted in another state
    ///
    /// **When returned:** `setup` or `enable_lifetime_histogram` outside `Idle`
    ///
    /// **Recovery strategy:** stop the session, then reconfigure
    #[error("cannot {operation} while tracer is {state}")]
    InvalidState {
        operation: &'static str,
        state: TracerState,
    },

    /// `resume` while the allocation hook is already enabled
    #[error("allocation hook is already enabled")]
    HookAlreadyEnabled,

    /// `pause` while the allocation hook is already disabled
    #[error("allocation hook is already disabled")]
    HookAlreadyDisabled,

    /// `setup` was given a field name that is not a key dimension
    ///
    /// The previous key layout is kept.
    #[error("unknown key field: {0:?} (expected one of path, line, type, class)")]
    UnknownField(String),

    /// A configuration value failed validation
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The unit of work passed to `trace` failed
    ///
    /// The tracer has already been returned to `Idle`. `snapshot` is the
    /// final result view of the abandoned session, with every free observed
    /// before the failure folded in.
    #[error("traced work failed: {source}")]
    Work {
        source: anyhow::Error,
        snapshot: Box<Snapshot>,
    },
}

impl TracerError {
    /// Check if this error reports a call made in the wrong state
    pub fn is_sequencing(&self) -> bool {
        matches!(
            self,
            TracerError::AlreadyRunning
                | TracerError::NotStarted
                | TracerError::InvalidState { .. }
                | TracerError::HookAlreadyEnabled
                | TracerError::HookAlreadyDisabled
        )
    }

    /// Final result view carried by a [`TracerError::Work`]
    pub fn work_snapshot(&self) -> Option<&Snapshot> {
        match self {
            TracerError::Work { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    /// Check if this error reports a rejected configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TracerError::UnknownField(_) | TracerError::Configuration(_)
        )
    }
}

/// Result type alias for tracer operations
pub type Result<T> = std::result::Result<T, TracerError>;

/// Panic when an internal-consistency condition does not hold
///
/// Used on the hook and drain paths where a broken invariant means the
/// aggregate tables are already wrong.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $context:expr) => {
        if !$cond {
            panic!(
                "tracer invariant violated at {}: {}",
                stringify!($cond),
                $context
            );
        }
    };
    ($cond:expr, $context:expr, $($arg:tt)*) => {
        if !$cond {
            panic!(
                "tracer invariant violated at {}: {}",
                stringify!($cond),
                format!($context, $($arg)*)
            );
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::KeyLayout;

    #[test]
    fn test_error_display() {
        let err = TracerError::InvalidState {
            operation: "setup",
            state: TracerState::Running,
        };
        assert_eq!(err.to_string(), "cannot setup while tracer is running");

        let err = TracerError::UnknownField("file".to_string());
        assert_eq!(
            err.to_string(),
            "unknown key field: \"file\" (expected one of path, line, type, class)"
        );
    }

    #[test]
    fn test_classification() {
        assert!(TracerError::AlreadyRunning.is_sequencing());
        assert!(TracerError::HookAlreadyDisabled.is_sequencing());
        assert!(!TracerError::AlreadyRunning.is_configuration());

        assert!(TracerError::UnknownField("x".into()).is_configuration());
        assert!(TracerError::Configuration("x".into()).is_configuration());

        let work = TracerError::Work {
            source: anyhow::anyhow!("boom"),
            snapshot: Box::new(Snapshot::empty(KeyLayout::default(), 3)),
        };
        assert!(!work.is_sequencing());
        assert!(!work.is_configuration());
        assert_eq!(work.to_string(), "traced work failed: boom");
        assert_eq!(work.work_snapshot().map(Snapshot::epoch), Some(3));
        assert!(TracerError::NotStarted.work_snapshot().is_none());
    }

    #[test]
    #[should_panic(expected = "tracer invariant violated at 1 > 2: left side 1")]
    fn test_invariant_macro_panics() {
        invariant!(1 > 2, "left side {}", 1);
    }

    #[test]
    fn test_invariant_macro_passes() {
        invariant!(2 > 1, "never shown");
    }
}
