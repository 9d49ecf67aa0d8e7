//! CLI module for shardwrangler
//!
//! Provides command-line interface for:
//! - reparent: Replace a shard's master with one of its replicas
//! - show: Print a shard's record and tablets

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{execute_reparent, reparent, run, run_command, shard_view, show, Config};
pub use errors::{CliError, CliErrorCode, CliResult};
