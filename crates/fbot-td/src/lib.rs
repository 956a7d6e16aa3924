//! # fbot-td
//!
//! Order execution for Binance USDT-margined futures.
//!
//! The exchange is reached through the [`ExchangeApi`] trait; every other
//! component talks to it only via the [`OrderGateway`](gateway::OrderGateway),
//! which adds retries, error classification and clock-adjusted timestamps.
//!
//! ```text
//! TradingEngine
//! ├── PrecisionNormalizer  (symbol rules cache, rounding)
//! ├── strategy::{simple, twap, grid}  (intent → child orders)
//! ├── OrderGateway         (retry / backoff / resync around ExchangeApi)
//! │   └── ClockSync        (server time offset, periodic resync task)
//! └── OrderLedger          (runs, outcomes, cancellation signals)
//! ```
//!
//! ## Transports
//!
//! | Exchange        | Module    | Endpoints            |
//! |-----------------|-----------|----------------------|
//! | Binance Futures | `binance` | `/fapi/v1`, `/fapi/v2` REST |

pub mod binance;
pub mod clock;
pub mod config;
pub mod engine;
pub mod event;
pub mod gateway;
pub mod ledger;
pub mod precision;
pub mod scheduler;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;

use async_trait::async_trait;
use fbot_core::error::ExchangeError;
use fbot_core::types::*;
use rust_decimal::Decimal;

pub use engine::TradingEngine;

/// The exchange capabilities the engine relies on.
///
/// Implementations are responsible for authentication and request signing.
/// Signed calls take the request `timestamp` (ms) from the caller so that
/// clock-skew correction stays in one place.
///
/// All methods take `&self` so a single client can be shared by concurrent
/// runs behind an `Arc`.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Trading rules for every listed symbol.
    async fn get_exchange_info(&self) -> Result<HashMap<String, SymbolRules>, ExchangeError>;

    /// Exchange server time in ms since epoch.
    async fn get_server_time(&self) -> Result<u64, ExchangeError>;

    /// Last traded price.
    async fn get_symbol_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    /// Submit a new order.
    async fn create_order(&self, request: &OrderRequest, timestamp: u64) -> Result<OrderAck, ExchangeError>;

    /// Cancel a resting order and return its final state.
    async fn cancel_order(&self, symbol: &str, order_id: u64, timestamp: u64) -> Result<OrderSnapshot, ExchangeError>;

    /// Query one order.
    async fn get_order(&self, symbol: &str, order_id: u64, timestamp: u64) -> Result<OrderSnapshot, ExchangeError>;

    /// Query one order by the client order id it was submitted with.
    async fn get_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
        timestamp: u64,
    ) -> Result<OrderSnapshot, ExchangeError>;

    /// Open orders, optionally restricted to one symbol.
    async fn get_open_orders(&self, symbol: Option<&str>, timestamp: u64) -> Result<Vec<OrderSnapshot>, ExchangeError>;

    /// Wallet balance per asset.
    async fn get_account_balance(&self, timestamp: u64) -> Result<Balances, ExchangeError>;
}
