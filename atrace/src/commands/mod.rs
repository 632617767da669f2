//! Command modules for the atrace CLI.
//!
//! Each subcommand lives in its own file with an `*Args` struct and a
//! `run_*` entry point.

pub mod common;

pub mod header;
pub mod init;
pub mod replay;

pub use header::{run_header, HeaderArgs};
pub use init::{run_init, InitArgs};
pub use replay::{run_replay, ReplayArgs};
