//! Enumerations used throughout the execution engine.
//!
//! Wire spellings follow the Binance Futures REST API (`BUY`, `LIMIT`, `GTC`,
//! `PARTIALLY_FILLED`, ...) so the same values can be logged, serialized to
//! config, and sent to the exchange without a second mapping table.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order enums
// ---------------------------------------------------------------------------

/// Buy or sell direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Exchange spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(format!("invalid side '{other}', expected BUY or SELL")),
        }
    }
}

/// Order type as seen by the strategies.
///
/// `StopLimit` is sent to Binance Futures as type `STOP` (a stop order that
/// rests as a limit order once triggered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopLimit,
}

impl OrderType {
    /// Value of the `type` parameter on the futures order endpoint.
    pub fn exchange_type(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopLimit => "STOP",
        }
    }

    /// Whether the exchange requires a limit price for this type.
    pub fn requires_price(self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => f.write_str("MARKET"),
            Self::Limit => f.write_str("LIMIT"),
            Self::StopLimit => f.write_str("STOP_LIMIT"),
        }
    }
}

/// Time in force for resting orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    #[default]
    Gtc,
    Ioc,
    Fok,
    Gtx,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
            Self::Gtx => "GTX",
        }
    }
}

impl std::str::FromStr for TimeInForce {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GTC" => Ok(Self::Gtc),
            "IOC" => Ok(Self::Ioc),
            "FOK" => Ok(Self::Fok),
            "GTX" => Ok(Self::Gtx),
            other => Err(format!("invalid time in force '{other}'")),
        }
    }
}

/// Exchange-side order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    PendingCancel,
}

impl OrderStatus {
    /// Map a Binance status string. Unknown values are treated as `New`.
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "NEW" | "NEW_INSURANCE" | "NEW_ADL" => Self::New,
            "PARTIALLY_FILLED" => Self::PartiallyFilled,
            "FILLED" => Self::Filled,
            "CANCELED" => Self::Canceled,
            "REJECTED" => Self::Rejected,
            "EXPIRED" | "EXPIRED_IN_MATCH" => Self::Expired,
            "PENDING_CANCEL" => Self::PendingCancel,
            _ => Self::New,
        }
    }

    /// An order in this state can still rest on the book and be cancelled.
    pub fn is_open(self) -> bool {
        matches!(self, Self::New | Self::PartiallyFilled)
    }
}

// ---------------------------------------------------------------------------
// Strategy enums
// ---------------------------------------------------------------------------

/// Which strategy produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Simple,
    Twap,
    Grid,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => f.write_str("simple"),
            Self::Twap => f.write_str("twap"),
            Self::Grid => f.write_str("grid"),
        }
    }
}

/// Aggregate status of a strategy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    PartiallyFilled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyFilled | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Price rounding mode applied to limit and stop prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceRounding {
    /// Nearest tick; exact ties go toward the reference (market) price.
    #[default]
    Nearest,
    Down,
    Up,
}
