//! Tracer Configuration
//!
//! Configuration options for a tracing session. Everything here is fixed
//! while a session is active; [`Tracer::setup`](crate::Tracer::setup) and
//! [`Tracer::enable_lifetime_histogram`](crate::Tracer::enable_lifetime_histogram)
//! change it between sessions.

use serde::{Deserialize, Serialize};

use crate::aggregate::KeyLayout;
use crate::error::{Result, TracerError};
use crate::logging::EventLogConfig;

/// Largest record pool the tracer will keep
pub const MAX_RECORD_POOL: usize = 1 << 24;

/// Upper bound for `live_capacity`
pub const MAX_LIVE_CAPACITY: usize = 1 << 28;

/// Upper bound for `type_tag_hint`
pub const MAX_TYPE_TAG_HINT: usize = 1 << 16;

/// Tracer configuration
///
/// # Examples
///
/// ```
/// use alloctrace::TracerConfig;
///
/// let config = TracerConfig::default();
/// assert_eq!(config.keys.names(), vec!["path", "line"]);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Dimensions that make up every aggregate key
    ///
    /// **Default:** path and line
    pub keys: KeyLayout,

    /// Collect per-type lifetime histograms of freed objects
    ///
    /// **Default:** false
    pub lifetime_histogram: bool,

    /// Initial capacity of the live allocation table
    ///
    /// Only a sizing hint; the table grows as needed.
    ///
    /// **Default:** 1024
    pub live_capacity: usize,

    /// Maximum number of drained records kept for reuse
    ///
    /// Records beyond the limit are returned to the allocator. 0 disables
    /// recycling.
    ///
    /// **Constraints:** at most 1<<24
    ///
    /// **Default:** 4096
    pub record_pool_limit: usize,

    /// Initial length of the per-type counter arrays
    ///
    /// The arrays still grow on demand for larger tags.
    ///
    /// **Constraints:** must be > 0
    ///
    /// **Default:** 32
    pub type_tag_hint: usize,

    /// Lifecycle event log settings
    pub event_log: EventLogConfig,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            keys: KeyLayout::default(),
            lifetime_histogram: false,
            live_capacity: 1024,
            record_pool_limit: 4096,
            type_tag_hint: 32,
            event_log: EventLogConfig::default(),
        }
    }
}

impl TracerConfig {
    /// Validate configuration
    ///
    /// # Returns
    ///
    /// `Ok(())` if valid, [`TracerError::Configuration`] naming the first
    /// offending field otherwise.
    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(TracerError::Configuration(
                "keys must name at least one field".to_string(),
            ));
        }

        if self.record_pool_limit > MAX_RECORD_POOL {
            return Err(TracerError::Configuration(format!(
                "record_pool_limit ({}) must not exceed {}",
                self.record_pool_limit, MAX_RECORD_POOL
            )));
        }

        if self.type_tag_hint == 0 || self.type_tag_hint > MAX_TYPE_TAG_HINT {
            return Err(TracerError::Configuration(format!(
                "type_tag_hint ({}) must be between 1 and {}",
                self.type_tag_hint, MAX_TYPE_TAG_HINT
            )));
        }

        if self.live_capacity > MAX_LIVE_CAPACITY {
            return Err(TracerError::Configuration(format!(
                "live_capacity ({}) must not exceed {}",
                self.live_capacity, MAX_LIVE_CAPACITY
            )));
        }

        Ok(())
    }

    /// Builder-style key layout override
    pub fn with_keys(mut self, keys: KeyLayout) -> Self {
        self.keys = keys;
        self
    }

    /// Builder-style lifetime histogram switch
    pub fn with_lifetime_histogram(mut self, enabled: bool) -> Self {
        self.lifetime_histogram = enabled;
        self
    }
}
