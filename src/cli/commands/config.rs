//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, ConstructionStrategy};
use crate::error::{CacheError, CacheResult};
use crate::registry::CacheMode;
use crate::ui::{self, UiContext};

const VALID_KEYS: &[&str] = &[
    "general.verbose",
    "general.log_format",
    "manager.construction",
    "manager.label",
    "stress.threads",
    "stress.tokens",
    "stress.rounds",
    "stress.mode",
];

/// Execute the config command
pub fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> CacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force)?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, config, &key, &value)?,
    }

    Ok(())
}

fn show_config(config: &Config) -> CacheResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn init_config(manager: &ConfigManager, force: bool) -> CacheResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::note(
            &ctx,
            &format!(
                "Config already exists at {} (use --force to overwrite)",
                path.display()
            ),
        );
        return Ok(());
    }

    manager.save(&Config::default())?;
    ui::check(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
        true,
    );

    Ok(())
}

fn set_value(manager: &ConfigManager, config: &Config, key: &str, value: &str) -> CacheResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();
    apply(&mut config, key, value)?;

    manager.save(&config)?;
    ui::check(&ctx, "Set", &format!("{} = {}", key, value), true);

    Ok(())
}

/// Apply one dot-separated `key = value` assignment
pub fn apply(config: &mut Config, key: &str, value: &str) -> CacheResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "verbose"] => config.general.verbose = parse_bool(value)?,
        ["general", "log_format"] => config.general.log_format = parse_log_format(value)?,

        ["manager", "construction"] => config.manager.construction = parse_strategy(value)?,
        ["manager", "label"] => {
            config.manager.label = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        }

        ["stress", "threads"] => config.stress.threads = parse_count(value)?,
        ["stress", "tokens"] => config.stress.tokens = parse_count(value)?,
        ["stress", "rounds"] => config.stress.rounds = parse_count(value)?,
        ["stress", "mode"] => config.stress.mode = value.parse::<CacheMode>()?,

        _ => {
            return Err(CacheError::User(format!(
                "Unknown config key '{}'. Valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> CacheResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(CacheError::User(format!("Invalid boolean value: {}", value))),
    }
}

fn parse_count(value: &str) -> CacheResult<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CacheError::User(format!(
            "Invalid count: {} (expected a positive integer)",
            value
        ))),
    }
}

fn parse_log_format(value: &str) -> CacheResult<String> {
    match value {
        "text" | "json" => Ok(value.to_string()),
        _ => Err(CacheError::User(format!(
            "Invalid log format: {} (expected text or json)",
            value
        ))),
    }
}

fn parse_strategy(value: &str) -> CacheResult<ConstructionStrategy> {
    match value.to_lowercase().as_str() {
        "speculative" => Ok(ConstructionStrategy::Speculative),
        "locked" => Ok(ConstructionStrategy::Locked),
        _ => Err(CacheError::User(format!(
            "Invalid construction strategy: {} (expected speculative or locked)",
            value
        ))),
    }
}
