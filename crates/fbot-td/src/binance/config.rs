//! Binance Futures transport configuration.
//!
//! Holds API credentials and the REST endpoint. Everything except the
//! credentials has a default, and the default endpoint is the futures testnet.

use fbot_core::error::ConfigError;
use serde::Deserialize;

/// Configuration for the Binance USDT-M futures client.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceFuturesConfig {
    /// Binance API key.
    pub api_key: String,

    /// Binance API secret (HMAC-SHA256 signing).
    pub secret_key: String,

    /// REST base URL.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// `recvWindow` for signed requests (milliseconds).
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,

    /// Per-request HTTP timeout (milliseconds).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for BinanceFuturesConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            rest_url: default_rest_url(),
            recv_window: default_recv_window(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl BinanceFuturesConfig {
    /// Reject empty or placeholder credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_placeholder(&self.api_key) {
            return Err(ConfigError::MissingCredential("binance.api_key"));
        }
        if is_placeholder(&self.secret_key) {
            return Err(ConfigError::MissingCredential("binance.secret_key"));
        }
        if self.recv_window == 0 || self.recv_window > 60_000 {
            return Err(ConfigError::Invalid(format!(
                "binance.recv_window must be within 1..=60000, got {}",
                self.recv_window
            )));
        }
        Ok(())
    }
}

/// Empty, or a value left over from a config template.
fn is_placeholder(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    v.is_empty() || v.starts_with("your") || v.contains("api_key_here") || v.contains("secret_here") || v == "..."
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_rest_url() -> String {
    "https://testnet.binancefuture.com".into()
}

fn default_recv_window() -> u64 {
    60_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_testnet() {
        let cfg: BinanceFuturesConfig = serde_json::from_str(r#"{"api_key": "k", "secret_key": "s"}"#).unwrap();
        assert_eq!(cfg.rest_url, "https://testnet.binancefuture.com");
        assert_eq!(cfg.recv_window, 60_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn placeholder_credentials_are_rejected() {
        for key in ["", "  ", "your_api_key", "YOUR API KEY", "api_key_here"] {
            let cfg = BinanceFuturesConfig { api_key: key.into(), secret_key: "s".into(), ..Default::default() };
            assert!(matches!(cfg.validate(), Err(ConfigError::MissingCredential("binance.api_key"))), "{key:?}");
        }
        let cfg = BinanceFuturesConfig { api_key: "k".into(), secret_key: "your_secret".into(), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingCredential("binance.secret_key"))));
    }

    #[test]
    fn recv_window_above_exchange_limit_is_rejected() {
        let cfg = BinanceFuturesConfig {
            api_key: "k".into(),
            secret_key: "s".into(),
            recv_window: 90_000,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }
}
