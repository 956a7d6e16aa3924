//! Evenly spaced resting limit orders.
//!
//! Side/range consistency is not enforced: a BUY grid above the market is
//! sent as requested and the exchange decides what fills.

use std::time::Duration;

use fbot_core::error::{BotError, PrecisionError, ValidationError};
use fbot_core::types::*;
use rust_decimal::Decimal;

use super::{Plan, client_order_id, require_child_count, require_positive, split_quantity};

pub fn validate(intent: &GridIntent) -> Result<(), ValidationError> {
    require_positive("total quantity", intent.total_quantity)?;
    require_positive("lower price", intent.lower_price)?;
    if intent.lower_price >= intent.upper_price {
        return Err(ValidationError::InvalidRange { lower: intent.lower_price, upper: intent.upper_price });
    }
    if intent.levels < 2 {
        return Err(ValidationError::TooFewGridLevels(intent.levels));
    }
    require_child_count(intent.levels)
}

/// `lower + i * (upper - lower) / (levels - 1)`, rounded to the tick grid.
///
/// Fails with `GridTooDense` when two levels land on the same tick.
pub fn level_prices(
    intent: &GridIntent,
    rules: &SymbolRules,
    rounding: PriceRounding,
    reference: Option<Decimal>,
) -> Result<Vec<Decimal>, ValidationError> {
    require_child_count(intent.levels)?;
    let spacing = (intent.upper_price - intent.lower_price) / Decimal::from(intent.levels - 1);
    let mut prices: Vec<Decimal> = Vec::with_capacity(intent.levels as usize);
    for i in 0..intent.levels {
        let raw = intent.lower_price + spacing * Decimal::from(i);
        let price = rules.round_price(raw, rounding, reference);
        if prices.last().is_some_and(|prev| *prev >= price) {
            return Err(ValidationError::GridTooDense { lower: intent.lower_price, upper: intent.upper_price });
        }
        prices.push(price);
    }
    Ok(prices)
}

/// One GTC LIMIT request per level, lowest price first.
pub fn plan(
    intent: &GridIntent,
    rules: &SymbolRules,
    rounding: PriceRounding,
    reference: Option<Decimal>,
    run_id: RunId,
) -> Result<Plan, BotError> {
    validate(intent)?;

    let prices = level_prices(intent, rules, rounding, reference)?;
    let quantities = split_quantity(intent.total_quantity, intent.levels, rules);

    let mut requests = Vec::with_capacity(prices.len());
    for (index, (price, qty)) in prices.into_iter().zip(quantities).enumerate() {
        if price <= Decimal::ZERO {
            return Err(PrecisionError::InvalidPrice(price).into());
        }
        rules.check_quantity(qty)?;
        rules.check_notional(price, qty)?;
        requests.push(OrderRequest::limit(&intent.symbol, intent.side, qty, price, client_order_id(run_id, index)));
    }

    Ok(Plan { requests, interval: Duration::ZERO })
}
