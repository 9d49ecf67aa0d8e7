//! CLI argument definitions using clap
//!
//! Commands:
//! - shardwrangler reparent --config <path> --shard <keyspace/shard> --master-elect <tablet>
//! - shardwrangler show --config <path> --shard <keyspace/shard>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shardwrangler - shard master failover
#[derive(Parser, Debug)]
#[command(name = "shardwrangler")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replace a dead shard master with a replica
    Reparent {
        /// Path to configuration file
        #[arg(long, default_value = "./shardwrangler.json")]
        config: PathBuf,

        /// Shard to reparent, as keyspace/shard
        #[arg(long)]
        shard: String,

        /// Tablet to promote
        #[arg(long)]
        master_elect: String,

        /// Skip consistency checks; the master-elect's data was synchronized
        /// externally. Allows reparenting to the current master.
        #[arg(long)]
        force: bool,

        /// Keep the new master read-only
        #[arg(long)]
        leave_master_read_only: bool,
    },

    /// Print a shard's record and tablets
    Show {
        /// Path to configuration file
        #[arg(long, default_value = "./shardwrangler.json")]
        config: PathBuf,

        /// Shard to show, as keyspace/shard
        #[arg(long)]
        shard: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
