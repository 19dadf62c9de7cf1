//! Command-line interface for agent-bench.
//!
//! Provides commands for running benchmark batches, listing tasks, and
//! reading rankings and history from the results store.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
