//! Configuration schema for cachereg
//!
//! Configuration is stored at `~/.config/cachereg/config.toml`

use crate::registry::CacheMode;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache manager settings
    pub manager: ManagerConfig,

    /// Defaults for the stress command
    pub stress: StressConfig,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// How a shared-mode miss builds its instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstructionStrategy {
    /// Build outside the lock; a racing loser's instance is dropped
    #[default]
    Speculative,
    /// Build while holding the manager lock; never builds twice
    Locked,
}

impl ConstructionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ConstructionStrategy::Speculative => "speculative",
            ConstructionStrategy::Locked => "locked",
        }
    }
}

/// Cache manager settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Construction strategy for shared-mode misses
    pub construction: ConstructionStrategy,

    /// Label shown in log lines
    pub label: Option<String>,
}

/// Stress command defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Worker threads
    pub threads: usize,

    /// Tokens registered per run
    pub tokens: usize,

    /// Lookups of every token per thread
    pub rounds: usize,

    /// Allocation mode of the registered tokens
    pub mode: CacheMode,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            tokens: 16,
            rounds: 100,
            mode: CacheMode::Shared,
        }
    }
}
