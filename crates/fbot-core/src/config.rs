//! Configuration blocks shared by every component.
//!
//! The runner reads a single JSON file. This module defines the
//! exchange-independent sections (`logging`, `engine`); exchange credentials
//! and endpoints live next to the transport in `fbot-td`.
//!
//! # Example
//!
//! ```json
//! {
//!   "logging": { "level": "info", "log_dir": "logs" },
//!   "engine": {
//!     "price_rounding": "nearest",
//!     "clock_resync_secs": 300,
//!     "retry": { "max_attempts": 3, "backoff_initial_ms": 1000, "backoff_max_ms": 8000 }
//!   },
//!   "binance": { "api_key": "...", "secret_key": "..." }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ConfigError;
use crate::types::PriceRounding;

/// Logging section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the per-session log file (console only when absent).
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Log file prefix.
    #[serde(default = "default_module_name")]
    pub module_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
            module_name: default_module_name(),
        }
    }
}

/// Gateway retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts for network / 5xx failures (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between network / 5xx retries.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// First backoff after a rate-limit rejection.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Backoff ceiling.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Attempts for rate-limited calls (including the first).
    #[serde(default = "default_max_backoff_attempts")]
    pub max_backoff_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_backoff_attempts: default_max_backoff_attempts(),
        }
    }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Backoff before rate-limited retry number `n` (0-based): doubles from
    /// `backoff_initial_ms`, capped at `backoff_max_ms`.
    pub fn backoff(&self, n: u32) -> Duration {
        let factor = 1u64.checked_shl(n).unwrap_or(u64::MAX);
        let ms = self.backoff_initial_ms.saturating_mul(factor).min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// Engine section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Rounding applied to limit and stop prices.
    #[serde(default)]
    pub price_rounding: PriceRounding,

    /// Interval between exchange clock re-syncs.
    #[serde(default = "default_clock_resync_secs")]
    pub clock_resync_secs: u64,

    /// Fetch the market price before planning, for rounding ties and
    /// market-order notional checks.
    #[serde(default = "default_true")]
    pub use_market_reference: bool,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            price_rounding: PriceRounding::default(),
            clock_resync_secs: default_clock_resync_secs(),
            use_market_reference: true,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject policy numbers that would disable retries or resyncs entirely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 || self.retry.max_backoff_attempts == 0 {
            return Err(ConfigError::Invalid("retry attempts must be at least 1".into()));
        }
        if self.retry.backoff_initial_ms == 0 || self.retry.backoff_max_ms < self.retry.backoff_initial_ms {
            return Err(ConfigError::Invalid(
                "backoff_initial_ms must be positive and not above backoff_max_ms".into(),
            ));
        }
        if self.clock_resync_secs == 0 {
            return Err(ConfigError::Invalid("clock_resync_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Load and parse a JSON config file into any deserializable type.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    let config: T = serde_json::from_str(&content)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_log_level() -> String {
    "info".into()
}

fn default_module_name() -> String {
    "fbot".into()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_max_backoff_attempts() -> u32 {
    5
}

fn default_clock_resync_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}
