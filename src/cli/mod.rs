//! Command-line interface for synth-forge.
//!
//! Provides commands for dataset generation, registry listings and
//! inspection of exported CSV files.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
