//! Trading-related data structures: order requests, exchange
//! acknowledgements, snapshots and outcomes.
//!
//! These types flow from the strategies through the gateway to the exchange
//! transport and back into the ledger.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{OrderStatus, OrderType, Side, TimeInForce};
use crate::error::{ExchangeError, GatewayError};

// ---------------------------------------------------------------------------
// Order request (strategy → gateway)
// ---------------------------------------------------------------------------

/// A normalized order, built by a strategy and consumed once by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Exchange symbol (e.g. `"BTCUSDT"`).
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Quantity, already a multiple of the symbol's step size.
    pub quantity: Decimal,
    /// Limit price (LIMIT / STOP_LIMIT only).
    pub price: Option<Decimal>,
    /// Trigger price (STOP_LIMIT only).
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
    /// `newClientOrderId`; stable across retries of the same request.
    pub client_order_id: String,
}

impl OrderRequest {
    /// A market order.
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal, client_order_id: String) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            client_order_id,
        }
    }

    /// A GTC limit order.
    pub fn limit(
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        client_order_id: String,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id,
        }
    }

    /// A short human-readable summary for log lines.
    pub fn summary(&self) -> String {
        let mut s = format!("{} {} {} qty={}", self.order_type, self.symbol, self.side, self.quantity);
        if let Some(p) = self.price {
            s.push_str(&format!(" price={p}"));
        }
        if let Some(sp) = self.stop_price {
            s.push_str(&format!(" stop={sp}"));
        }
        s
    }
}

// ---------------------------------------------------------------------------
// Exchange responses (transport → gateway)
// ---------------------------------------------------------------------------

/// Acknowledgement of a newly created order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Exchange-assigned order ID.
    pub order_id: u64,
    pub client_order_id: String,
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub executed_qty: Decimal,
    /// Average fill price (zero when nothing has filled).
    pub avg_price: Decimal,
}

/// The state of an order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub symbol: String,
    /// Exchange-assigned order ID.
    pub order_id: u64,
    pub client_order_id: String,
    pub status: OrderStatus,
    pub side: Side,
    /// Exchange order type string (`LIMIT`, `STOP`, ...).
    pub order_type: String,
    pub price: Decimal,
    pub stop_price: Decimal,
    /// Original order quantity.
    pub quantity: Decimal,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    pub avg_price: Decimal,
    /// Last update (ms since epoch).
    pub update_time: u64,
}

/// Wallet balance per asset.
pub type Balances = BTreeMap<String, Decimal>;

// ---------------------------------------------------------------------------
// Outcomes (gateway → strategy / ledger)
// ---------------------------------------------------------------------------

/// Result of submitting (or querying) one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderOutcome {
    Accepted {
        order_id: u64,
        filled_qty: Decimal,
        avg_price: Decimal,
        status: OrderStatus,
    },
    Rejected {
        reason: String,
        /// Exchange error code, when the exchange returned one.
        code: Option<i64>,
        /// Resubmitting unchanged could succeed. The gateway reports `false`
        /// once it has given up on a request.
        retryable: bool,
    },
}

impl OrderOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Exchange order ID of an accepted order.
    pub fn order_id(&self) -> Option<u64> {
        match self {
            Self::Accepted { order_id, .. } => Some(*order_id),
            Self::Rejected { .. } => None,
        }
    }

    /// Accepted and still resting on the book.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Accepted { status, .. } if status.is_open())
    }
}

impl From<OrderAck> for OrderOutcome {
    fn from(ack: OrderAck) -> Self {
        Self::Accepted {
            order_id: ack.order_id,
            filled_qty: ack.executed_qty,
            avg_price: ack.avg_price,
            status: ack.status,
        }
    }
}

impl From<OrderSnapshot> for OrderOutcome {
    fn from(snap: OrderSnapshot) -> Self {
        Self::Accepted {
            order_id: snap.order_id,
            filled_qty: snap.filled_quantity,
            avg_price: snap.avg_price,
            status: snap.status,
        }
    }
}

impl From<GatewayError> for OrderOutcome {
    fn from(err: GatewayError) -> Self {
        Self::Rejected {
            code: err.source.code(),
            reason: err.to_string(),
            retryable: false,
        }
    }
}

/// Result of one per-order cancel issued for a run.
#[derive(Debug, Clone)]
pub struct CancelResult {
    pub symbol: String,
    pub order_id: u64,
    pub result: Result<OrderStatus, ExchangeError>,
}
