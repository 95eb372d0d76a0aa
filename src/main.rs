//! cachereg - owner-scoped cache registry
//!
//! CLI entry point that dispatches to subcommands.

use cachereg::cli::{Cli, Commands};
use cachereg::config::ConfigManager;
use cachereg::error::CacheResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load()?;

    // 0 = warn, 1 = info, 2+ = debug; general.verbose raises the floor to info
    let level = match (cli.verbose, config.general.verbose) {
        (0, false) => "warn",
        (0, true) | (1, _) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::new(format!("cachereg={}", level));

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
    debug!("Using config at {}", config_manager.path().display());

    match cli.command {
        Commands::Stress(args) => cachereg::cli::commands::stress(args, &config),
        Commands::Scenario => cachereg::cli::commands::scenario(&config),
        Commands::Config(args) => cachereg::cli::commands::config(args, &config_manager, &config),
    }
}
