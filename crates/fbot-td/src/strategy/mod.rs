//! Strategies: expand an intent into an ordered list of child orders.
//!
//! Planning is pure. It needs the symbol's rules and, optionally, the current
//! market price; it never talks to the exchange. The engine drives the
//! resulting [`Plan`] through the gateway and records outcomes in the ledger.
//!
//! | Strategy | Children               | Pacing              |
//! |----------|------------------------|---------------------|
//! | Simple   | 1 (MARKET/LIMIT/STOP)  | n/a                 |
//! | TWAP     | `slices` MARKET        | `duration / slices` |
//! | Grid     | `levels` LIMIT (GTC)   | none                |

pub mod grid;
pub mod simple;
pub mod twap;

use std::time::Duration;

use fbot_core::error::ValidationError;
use fbot_core::types::{OrderRequest, RunId, SymbolRules};
use rust_decimal::Decimal;

/// Child orders for one run, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub requests: Vec<OrderRequest>,
    /// Pause between consecutive submissions (zero = back to back).
    pub interval: Duration,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Upper bound on the child orders one run may plan.
pub const MAX_CHILD_ORDERS: u32 = 1_000;

/// `newClientOrderId` for child `index` of `run_id`.
///
/// Stable across retries of the same child and within Binance's 36-character
/// limit.
pub fn client_order_id(run_id: RunId, index: usize) -> String {
    format!("{}{index}", client_order_prefix(run_id))
}

/// Prefix shared by every child of `run_id`. Lets a later session find a
/// run's resting orders among the account's open orders.
pub fn client_order_prefix(run_id: RunId) -> String {
    let id = run_id.simple().to_string();
    format!("fb-{}-", &id[..20])
}

/// Split `total` into `parts` quantities on the step grid.
///
/// Every part but the last is `floor(total / parts)`; the last absorbs the
/// remainder, so the parts sum to `floor(total)`.
pub fn split_quantity(total: Decimal, parts: u32, rules: &SymbolRules) -> Vec<Decimal> {
    if parts == 0 {
        return Vec::new();
    }
    let total = rules.floor_quantity(total);
    let base = rules.floor_quantity(total / Decimal::from(parts));
    let mut quantities = vec![base; parts as usize];
    if let Some(last) = quantities.last_mut() {
        *last = (total - base * Decimal::from(parts - 1)).normalize();
    }
    quantities
}

pub(crate) fn require_child_count(requested: u32) -> Result<(), ValidationError> {
    if requested > MAX_CHILD_ORDERS {
        return Err(ValidationError::TooManyOrders { requested, max: MAX_CHILD_ORDERS });
    }
    Ok(())
}

pub(crate) fn require_positive(field: &'static str, value: Decimal) -> Result<(), ValidationError> {
    if value <= Decimal::ZERO {
        return Err(ValidationError::NonPositive { field, value });
    }
    Ok(())
}
