//! CLI argument definitions using clap derive

use crate::config::ConstructionStrategy;
use crate::registry::CacheMode;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// cachereg - owner-scoped cache registry
///
/// Exercises a cache manager from many threads and checks that every
/// shared cache is built once and every thread-local cache once per thread.
#[derive(Parser, Debug)]
#[command(name = "cachereg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CACHEREG_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Hammer one manager from many threads and verify its invariants
    Stress(StressArgs),

    /// Run the two-thread shared/thread-local walkthrough
    Scenario,

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the stress command
#[derive(Parser, Debug)]
pub struct StressArgs {
    /// Worker threads (defaults to stress.threads)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Cache types to register (defaults to stress.tokens)
    #[arg(long)]
    pub tokens: Option<usize>,

    /// Lookups of every token per thread (defaults to stress.rounds)
    #[arg(short, long)]
    pub rounds: Option<usize>,

    /// Allocation mode: shared or thread-local (defaults to stress.mode)
    #[arg(short, long, value_parser = parse_mode)]
    pub mode: Option<CacheMode>,

    /// Shared-mode construction strategy (defaults to manager.construction)
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

fn parse_mode(value: &str) -> Result<CacheMode, String> {
    value.parse::<CacheMode>().map_err(|e| e.to_string())
}

/// Construction strategy flag
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    Speculative,
    Locked,
}

impl From<StrategyArg> for ConstructionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Speculative => ConstructionStrategy::Speculative,
            StrategyArg::Locked => ConstructionStrategy::Locked,
        }
    }
}

/// Output format for reports
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable report
    #[default]
    Table,
    /// JSON output
    Json,
    /// Simple key=value lines
    Plain,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value (dot-separated key)
    Set {
        /// Key, e.g. manager.construction
        key: String,

        /// Value to store
        value: String,
    },
}
