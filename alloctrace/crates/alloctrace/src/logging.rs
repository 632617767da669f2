//! Tracer lifecycle logging
//!
//! Every lifecycle transition and every drain produces a [`TracerEvent`].
//! The [`EventLog`] keeps the most recent ones for inspection and forwards
//! each to the `log` facade, either as a human-readable line or as JSON.
//!
//! Log Levels:
//! - INFO: start, stop, pause, resume, clear
//! - DEBUG: drains, snapshots, reconfiguration
//!
//! Per-event hook activity is logged directly at TRACE by the tracer and
//! never passes through this module.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Log level for tracer events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    fn as_log(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Tracer event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracerEvent {
    /// Session started
    Started { keys: String, lifetime: bool },

    /// Allocation hook disabled
    Paused { live: usize },

    /// Allocation hook re-enabled
    Resumed { live: usize },

    /// Session ended and tables released
    Stopped { rows: usize, live: usize },

    /// Deferred frees folded into the aggregates
    Drained { records: usize, epoch: u64 },

    /// Result view produced
    Snapshot { rows: usize, live: usize, epoch: u64 },

    /// Aggregation state reset
    Cleared,

    /// Key layout or histogram switch changed while idle
    Reconfigured { keys: String, lifetime: bool },
}

impl TracerEvent {
    /// Level this event is logged at
    pub fn level(&self) -> LogLevel {
        match self {
            TracerEvent::Started { .. }
            | TracerEvent::Paused { .. }
            | TracerEvent::Resumed { .. }
            | TracerEvent::Stopped { .. }
            | TracerEvent::Cleared => LogLevel::Info,
            TracerEvent::Drained { .. }
            | TracerEvent::Snapshot { .. }
            | TracerEvent::Reconfigured { .. } => LogLevel::Debug,
        }
    }

    fn human(&self) -> String {
        match self {
            TracerEvent::Started { keys, lifetime } => format!(
                "[alloctrace] session started (keys: {}, lifetime histogram: {})",
                keys,
                on_off(*lifetime)
            ),
            TracerEvent::Paused { live } => {
                format!("[alloctrace] paused with {} live records", live)
            },
            TracerEvent::Resumed { live } => {
                format!("[alloctrace] resumed with {} live records", live)
            },
            TracerEvent::Stopped { rows, live } => format!(
                "[alloctrace] stopped: {} result rows, {} live records released",
                rows, live
            ),
            TracerEvent::Drained { records, epoch } => {
                format!("[alloctrace] drained {} freed records at epoch {}", records, epoch)
            },
            TracerEvent::Snapshot { rows, live, epoch } => format!(
                "[alloctrace] snapshot at epoch {}: {} rows ({} live records)",
                epoch, rows, live
            ),
            TracerEvent::Cleared => "[alloctrace] aggregation state cleared".to_string(),
            TracerEvent::Reconfigured { keys, lifetime } => format!(
                "[alloctrace] reconfigured (keys: {}, lifetime histogram: {})",
                keys,
                on_off(*lifetime)
            ),
        }
    }

    fn json(&self) -> serde_json::Value {
        match self {
            TracerEvent::Started { keys, lifetime } => serde_json::json!({
                "type": "started",
                "keys": keys,
                "lifetime": lifetime
            }),
            TracerEvent::Paused { live } => serde_json::json!({
                "type": "paused",
                "live": live
            }),
            TracerEvent::Resumed { live } => serde_json::json!({
                "type": "resumed",
                "live": live
            }),
            TracerEvent::Stopped { rows, live } => serde_json::json!({
                "type": "stopped",
                "rows": rows,
                "live": live
            }),
            TracerEvent::Drained { records, epoch } => serde_json::json!({
                "type": "drained",
                "records": records,
                "epoch": epoch
            }),
            TracerEvent::Snapshot { rows, live, epoch } => serde_json::json!({
                "type": "snapshot",
                "rows": rows,
                "live": live,
                "epoch": epoch
            }),
            TracerEvent::Cleared => serde_json::json!({ "type": "cleared" }),
            TracerEvent::Reconfigured { keys, lifetime } => serde_json::json!({
                "type": "reconfigured",
                "keys": keys,
                "lifetime": lifetime
            }),
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Event log configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Minimum level retained and forwarded
    pub level: LogLevel,

    /// Forward events as JSON instead of human-readable lines
    pub json: bool,

    /// Prefix forwarded lines with a local timestamp
    pub timestamps: bool,

    /// Number of recent events retained (0 retains none)
    pub capacity: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            timestamps: false,
            capacity: 256,
        }
    }
}

/// Bounded log of recent tracer events
#[derive(Debug)]
pub struct EventLog {
    config: EventLogConfig,
    events: VecDeque<(DateTime<Local>, TracerEvent)>,
    enabled: bool,
}

impl EventLog {
    /// Create new event log
    pub fn new(config: EventLogConfig) -> Self {
        Self {
            events: VecDeque::with_capacity(config.capacity.min(1024)),
            config,
            enabled: true,
        }
    }

    /// Enable logging
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disable logging
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Check if logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record an event
    pub fn log(&mut self, event: TracerEvent) {
        if !self.enabled {
            return;
        }

        let level = event.level();
        if level > self.config.level {
            return;
        }

        let now = Local::now();
        self.forward(level, now, &event);

        if self.config.capacity == 0 {
            return;
        }
        if self.events.len() == self.config.capacity {
            self.events.pop_front();
        }
        self.events.push_back((now, event));
    }

    fn forward(&self, level: LogLevel, now: DateTime<Local>, event: &TracerEvent) {
        let level = level.as_log();
        if !log::log_enabled!(level) {
            return;
        }

        let body = if self.config.json {
            match serde_json::to_string(&event.json()) {
                Ok(json) => json,
                Err(_) => return,
            }
        } else {
            event.human()
        };

        if self.config.timestamps {
            log::log!(level, "[{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), body);
        } else {
            log::log!(level, "{}", body);
        }
    }

    /// Retained events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &TracerEvent> {
        self.events.iter().map(|(_, event)| event)
    }

    /// Retained events with the time they were recorded
    pub fn timed_events(&self) -> impl Iterator<Item = &(DateTime<Local>, TracerEvent)> {
        self.events.iter()
    }

    /// Clear all events
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Active configuration
    pub fn config(&self) -> &EventLogConfig {
        &self.config
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(EventLogConfig::default())
    }
}
