//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// devmatch - match devices to drivers
#[derive(Parser)]
#[command(name = "devmatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Resolver configuration file (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true, env = "DEVMATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective resolver configuration
    Config,

    /// Replay a scenario file through a live resolver
    Simulate {
        /// Scenario file (TOML, YAML or JSON)
        scenario: PathBuf,

        /// How long to let the resolver settle, in milliseconds
        #[arg(long, default_value_t = 500)]
        settle_ms: u64,
    },
}
