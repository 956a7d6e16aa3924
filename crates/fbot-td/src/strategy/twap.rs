//! Time-weighted slicing of a market order.

use std::time::Duration;

use fbot_core::error::{BotError, ValidationError};
use fbot_core::types::*;
use rust_decimal::Decimal;

use super::{Plan, client_order_id, require_child_count, require_positive, split_quantity};

pub fn validate(intent: &TwapIntent) -> Result<(), ValidationError> {
    require_positive("total quantity", intent.total_quantity)?;
    if intent.slices == 0 {
        return Err(ValidationError::NoSlices);
    }
    require_child_count(intent.slices)
}

/// Pause between slices: `duration / slices`.
pub fn interval(duration_minutes: u32, slices: u32) -> Duration {
    if slices == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs(u64::from(duration_minutes) * 60) / slices
}

/// One MARKET request per slice.
///
/// Every slice is checked against the symbol rules up front, so an
/// unfillable plan fails before the first order is sent.
pub fn plan(intent: &TwapIntent, rules: &SymbolRules, reference: Option<Decimal>, run_id: RunId) -> Result<Plan, BotError> {
    validate(intent)?;

    let quantities = split_quantity(intent.total_quantity, intent.slices, rules);
    let mut requests = Vec::with_capacity(quantities.len());
    for (index, qty) in quantities.into_iter().enumerate() {
        rules.check_quantity(qty)?;
        if let Some(price) = reference {
            rules.check_notional(price, qty)?;
        }
        requests.push(OrderRequest::market(&intent.symbol, intent.side, qty, client_order_id(run_id, index)));
    }

    Ok(Plan { requests, interval: interval(intent.duration_minutes, intent.slices) })
}
