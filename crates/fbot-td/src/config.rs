//! Top-level bot configuration (one JSON file).

use std::path::Path;

use anyhow::Context;
use fbot_core::config::{EngineConfig, LoggingConfig, load_json};
use fbot_core::error::ConfigError;
use serde::Deserialize;

use crate::binance::BinanceFuturesConfig;

/// Root of the runner's config file.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    pub binance: BinanceFuturesConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.binance.validate()?;
        self.engine.validate()
    }
}

/// Load, parse and validate the config file.
pub fn load_config(path: &Path) -> anyhow::Result<BotConfig> {
    let config: BotConfig =
        load_json(path).with_context(|| format!("failed to read config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
