//! Replay command implementation.
//!
//! Feeds a recorded JSON-lines event stream through a tracer running on a
//! scripted host and prints the final result view. One event per line:
//!
//! ```text
//! {"op":"alloc","id":1,"type":5,"path":"app.rb","line":10,"class":16}
//! {"op":"gc","cycles":2}
//! {"op":"promote","id":1}
//! {"op":"free","id":1,"type":5,"size":40}
//! {"op":"safepoint"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Type tags above
//! [`MAX_TYPE_TAG`] and collections that would move the epoch past
//! [`MAX_EPOCH`] are rejected with the offending line, which also bounds
//! every age the tracer can record.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use alloctrace::report::{self, NameTable};
use alloctrace::{
    AllocationEvent, FreeEvent, Host, LifetimeTable, LiveRefresh, ObjectId, OwnerType, ScriptedHost,
    Snapshot, Tracer, TracerStats, TypeCounts, TypeTag,
};
use serde::Deserialize;

use crate::commands::common::{open_input, open_output, split_keys, OutputFormat};
use crate::config::Config;
use crate::error::{AtraceError, Result};

/// Largest type tag a stream may use
pub const MAX_TYPE_TAG: u32 = u16::MAX as u32;

/// Largest epoch a stream may reach
pub const MAX_EPOCH: u64 = 1 << 20;

/// Arguments for the replay command.
#[derive(Debug, Clone, Default)]
pub struct ReplayArgs {
    /// Enable verbose output.
    pub verbose: bool,
    /// Event stream to replay (`-` for standard input).
    pub events: PathBuf,
    /// Comma-separated key fields, overriding the configuration.
    pub keys: Option<String>,
    /// Collect and print the lifetime histogram.
    pub lifetime: bool,
    /// Report layout, overriding the configuration.
    pub format: Option<OutputFormat>,
    /// Print per-type allocated and freed counts.
    pub counts: bool,
    /// Write the report here instead of standard output.
    pub output: Option<PathBuf>,
}

/// One line of a recorded event stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Event {
    /// An object was allocated
    Alloc {
        id: u64,
        #[serde(rename = "type")]
        type_tag: u32,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        line: u32,
        #[serde(default)]
        class: Option<u64>,
    },
    /// An object was freed
    Free {
        id: u64,
        #[serde(rename = "type")]
        type_tag: u32,
        #[serde(default)]
        size: u64,
    },
    /// Collections completed
    Gc {
        #[serde(default = "one_cycle")]
        cycles: u64,
    },
    /// An object survived a collection
    Promote { id: u64 },
    /// The host now reports different type information for a living object
    Refresh {
        id: u64,
        #[serde(rename = "type")]
        type_tag: u32,
        #[serde(default)]
        class: Option<u64>,
    },
    /// The host reached a safe point and runs any pending drain job
    Safepoint,
    Pause,
    Resume,
    /// Log an intermediate result view
    Snapshot,
}

fn one_cycle() -> u64 {
    1
}

impl Event {
    /// Parse one stream line; `None` for blank lines and comments.
    pub fn parse(text: &str, line: usize) -> Result<Option<Self>> {
        let text = text.trim();
        if text.is_empty() || text.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(text)
            .map(Some)
            .map_err(|e| AtraceError::Event {
                line,
                message: e.to_string(),
            })
    }
}

/// Everything a finished replay produced.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub snapshot: Snapshot,
    pub lifetime: Option<LifetimeTable>,
    pub allocated: TypeCounts,
    pub freed: TypeCounts,
    pub stats: TracerStats,
    pub events: usize,
}

/// Drives a tracer over a scripted host, one event at a time.
pub struct Replayer {
    tracer: Tracer<ScriptedHost>,
    events: usize,
}

impl Replayer {
    /// Configure and start a session.
    pub fn start(config: &Config, keys: Option<&str>, lifetime: bool) -> Result<Self> {
        let mut tracer = Tracer::new(ScriptedHost::new(), config.tracer.clone())?;
        if let Some(keys) = keys {
            tracer.setup(&split_keys(keys))?;
        }
        if lifetime {
            tracer.enable_lifetime_histogram(true)?;
        }
        tracer.start()?;
        Ok(Self { tracer, events: 0 })
    }

    /// Apply one event.
    pub fn apply(&mut self, event: Event, line: usize) -> Result<()> {
        self.events += 1;
        match event {
            Event::Alloc {
                id,
                type_tag,
                path,
                line: source_line,
                class,
            } => {
                let mut event = AllocationEvent::new(ObjectId(id), type_tag_at(type_tag, line)?);
                event.line = source_line;
                event.path = path.as_deref();
                event.owner = class.map(OwnerType);
                self.tracer.on_allocate(event);
            },
            Event::Free { id, type_tag, size } => {
                let type_tag = type_tag_at(type_tag, line)?;
                self.tracer
                    .on_free(FreeEvent::new(ObjectId(id), type_tag, size));
                self.tracer.host_mut().forget(ObjectId(id));
            },
            Event::Gc { cycles } => {
                let previous = self.tracer.host().current_epoch();
                let advanced = self.tracer.host_mut().try_advance_epoch(cycles);
                if !advanced.is_some_and(|epoch| epoch <= MAX_EPOCH) {
                    return Err(AtraceError::Event {
                        line,
                        message: format!(
                            "{} cycles after epoch {} passes the epoch limit {}",
                            cycles, previous, MAX_EPOCH
                        ),
                    });
                }
            },
            Event::Promote { id } => self.tracer.host_mut().mark_promoted(ObjectId(id)),
            Event::Refresh { id, type_tag, class } => {
                let refresh = LiveRefresh {
                    type_tag: type_tag_at(type_tag, line)?,
                    owner: class.map(OwnerType),
                };
                self.tracer.host_mut().set_refresh(ObjectId(id), refresh);
            },
            Event::Safepoint => {
                if self.tracer.host_mut().take_pending_drain() {
                    let folded = self.tracer.run_deferred_drain();
                    tracing::debug!("line {}: drain folded {} records", line, folded);
                }
            },
            Event::Pause => self.tracer.pause()?,
            Event::Resume => self.tracer.resume()?,
            Event::Snapshot => {
                let snapshot = self.tracer.result()?;
                tracing::info!(
                    "line {}: {} rows, {} objects, {} alive at epoch {}",
                    line,
                    snapshot.len(),
                    snapshot.total_count(),
                    snapshot.live_objects(),
                    snapshot.epoch()
                );
            },
        }
        Ok(())
    }

    /// Replay a whole stream.
    pub fn replay<R: BufRead>(&mut self, input: R) -> Result<()> {
        for (index, text) in input.lines().enumerate() {
            let line = index + 1;
            if let Some(event) = Event::parse(&text?, line)? {
                self.apply(event, line)?;
            }
        }
        Ok(())
    }

    /// Stop the session and collect its results.
    pub fn finish(mut self) -> Result<ReplayOutcome> {
        let snapshot = self.tracer.stop()?;
        Ok(ReplayOutcome {
            snapshot,
            lifetime: self.tracer.take_lifetime_histogram(),
            allocated: self.tracer.allocated_count_by_type(),
            freed: self.tracer.freed_count_by_type(),
            stats: self.tracer.stats(),
            events: self.events,
        })
    }
}

fn type_tag_at(type_tag: u32, line: usize) -> Result<TypeTag> {
    if type_tag > MAX_TYPE_TAG {
        return Err(AtraceError::Event {
            line,
            message: format!("type tag {} exceeds {}", type_tag, MAX_TYPE_TAG),
        });
    }
    Ok(TypeTag(type_tag))
}

/// Replay command handler.
pub struct ReplayCommand {
    args: ReplayArgs,
    config: Config,
}

impl ReplayCommand {
    /// Create a new ReplayCommand.
    pub fn new(args: ReplayArgs, config: Config) -> Self {
        Self { args, config }
    }

    /// Execute the command.
    pub fn run(&self) -> Result<()> {
        let start_time = Instant::now();
        let names = self.config.names()?;

        let lifetime = self.args.lifetime || self.config.tracer.lifetime_histogram;
        let mut replayer = Replayer::start(&self.config, self.args.keys.as_deref(), lifetime)?;
        replayer.replay(open_input(&self.args.events)?)?;
        let outcome = replayer.finish()?;

        let mut out = open_output(self.args.output.as_deref())?;
        self.write_report(&mut out, &outcome, &names)?;
        out.flush()?;

        tracing::info!(
            "replayed {} events in {:?}: {} rows, {} records folded",
            outcome.events,
            start_time.elapsed(),
            outcome.snapshot.len(),
            outcome.stats.records_folded
        );
        if self.args.verbose {
            tracing::debug!("stats: {:?}", outcome.stats);
        }
        Ok(())
    }

    fn format(&self) -> OutputFormat {
        self.args.format.unwrap_or(self.config.output.format)
    }

    fn counts(&self) -> bool {
        self.args.counts || self.config.output.counts
    }

    fn write_report(&self, out: &mut dyn Write, outcome: &ReplayOutcome, names: &NameTable) -> Result<()> {
        match self.format() {
            OutputFormat::Json => {
                let document = self.json_report(outcome, names)?;
                serde_json::to_writer_pretty(&mut *out, &document)?;
                writeln!(out)?;
            },
            format => {
                if format == OutputFormat::Summary {
                    report::write_summary_tsv(out, &outcome.snapshot, names)?;
                } else {
                    report::write_result_tsv(out, &outcome.snapshot, names)?;
                }
                if let Some(lifetime) = &outcome.lifetime {
                    writeln!(out)?;
                    report::write_lifetime_tsv(out, lifetime, names)?;
                }
                if self.counts() {
                    writeln!(out)?;
                    writeln!(out, "# allocated")?;
                    report::write_counts(out, &outcome.allocated, names)?;
                    writeln!(out, "# freed")?;
                    report::write_counts(out, &outcome.freed, names)?;
                }
            },
        }
        Ok(())
    }

    fn json_report(&self, outcome: &ReplayOutcome, names: &NameTable) -> Result<serde_json::Value> {
        use alloctrace::report::Naming;

        let mut document = serde_json::json!({
            "header": outcome.snapshot.header(),
            "epoch": outcome.snapshot.epoch(),
            "live_objects": outcome.snapshot.live_objects(),
            "rows": report::result_json(&outcome.snapshot, names),
            "stats": serde_json::to_value(&outcome.stats)?,
        });

        if let Some(lifetime) = &outcome.lifetime {
            let table: serde_json::Map<String, serde_json::Value> = lifetime
                .iter()
                .map(|(tag, row)| (names.type_name(tag).into_owned(), serde_json::json!(row)))
                .collect();
            document["lifetime"] = serde_json::Value::Object(table);
        }
        if self.counts() {
            let counts = |counts: &TypeCounts| -> serde_json::Value {
                counts
                    .nonzero()
                    .map(|(tag, count)| (names.type_name(tag).into_owned(), serde_json::json!(count)))
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            };
            document["allocated"] = counts(&outcome.allocated);
            document["freed"] = counts(&outcome.freed);
        }
        Ok(document)
    }
}

/// Run the replay command.
pub fn run_replay(args: ReplayArgs, config: Config) -> Result<()> {
    ReplayCommand::new(args, config).run()
}
