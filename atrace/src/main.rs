//! atrace CLI - replay recorded allocation event streams.
//!
//! This is the main entry point for the atrace CLI application. It uses
//! clap for argument parsing and dispatches to the command handlers.

mod commands;
mod config;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::common::OutputFormat;
use commands::{run_header, run_init, run_replay, HeaderArgs, InitArgs, ReplayArgs};
use config::Config;
use error::{AtraceError, Result};

/// atrace - allocation tracing replay tool
///
/// Feeds a recorded stream of allocation, free and collection events
/// through the alloctrace engine and prints the aggregated statistics.
#[derive(Parser, Debug)]
#[command(name = "atrace")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replay allocation event streams through alloctrace", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, env = "ATRACE_VERBOSE")]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "ATRACE_CONFIG")]
    config: Option<PathBuf>,

    /// Disable color output
    #[arg(long, global = true, env = "ATRACE_NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the atrace CLI.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay an event stream and print the result
    ///
    /// Reads one JSON event per line (`-` for standard input), runs a
    /// complete tracing session over it and prints the final result view.
    Replay(ReplayCommand),

    /// Print the report header for a key layout
    Header(HeaderCommand),

    /// Write a starter atrace.toml
    Init(InitCommand),
}

/// Arguments for the replay subcommand.
#[derive(Parser, Debug)]
struct ReplayCommand {
    /// Event stream (JSON lines), or `-` for standard input
    events: PathBuf,

    /// Key fields, comma separated (path, line, type, class)
    #[arg(short, long)]
    keys: Option<String>,

    /// Collect and print the freed-object lifetime histogram
    #[arg(short, long)]
    lifetime: bool,

    /// Report format
    #[arg(short = 'F', long, value_enum)]
    format: Option<OutputFormat>,

    /// Also print per-type allocated and freed counts
    #[arg(long)]
    counts: bool,

    /// Write the report to a file instead of standard output
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Arguments for the header subcommand.
#[derive(Parser, Debug)]
struct HeaderCommand {
    /// Key fields, comma separated (path, line, type, class)
    #[arg(short, long)]
    keys: Option<String>,
}

/// Arguments for the init subcommand.
#[derive(Parser, Debug)]
struct InitCommand {
    /// Directory to write atrace.toml into (default: current directory)
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Key fields to record, comma separated
    #[arg(short, long)]
    keys: Option<String>,

    /// Overwrite an existing file
    #[arg(short, long)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.no_color)?;

    let config = load_config(cli.config.as_deref())?;

    execute_command(cli.command, cli.verbose, config)?;
    Ok(())
}

/// Initialize the logging system.
///
/// Log output goes to standard error so reports on standard output stay
/// machine-readable. `log` records from the engine are bridged in.
fn init_logging(verbose: bool, no_color: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let subscriber = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()
        .map_err(|e| AtraceError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

/// Execute the selected command.
fn execute_command(command: Commands, verbose: bool, config: Config) -> Result<()> {
    match command {
        Commands::Replay(args) => run_replay(
            ReplayArgs {
                verbose,
                events: args.events,
                keys: args.keys,
                lifetime: args.lifetime,
                format: args.format,
                counts: args.counts,
                output: args.output,
            },
            config,
        ),
        Commands::Header(args) => run_header(HeaderArgs { keys: args.keys }, config),
        Commands::Init(args) => run_init(InitArgs {
            verbose,
            force: args.force,
            path: args.path,
            keys: args.keys,
        }),
    }
}
