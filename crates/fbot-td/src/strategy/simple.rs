//! Single MARKET, LIMIT or STOP_LIMIT order.

use std::time::Duration;

use fbot_core::error::{BotError, PrecisionError, ValidationError};
use fbot_core::types::*;
use rust_decimal::Decimal;

use super::{Plan, client_order_id, require_positive};

/// Check the intent before any network call.
pub fn validate(intent: &SimpleIntent) -> Result<(), ValidationError> {
    require_positive("quantity", intent.quantity)?;
    if intent.order_type.requires_price() {
        let price = intent
            .price
            .ok_or(ValidationError::MissingPrice(order_type_label(intent.order_type)))?;
        require_positive("price", price)?;
    }
    if intent.order_type == OrderType::StopLimit {
        let stop = intent.stop_price.ok_or(ValidationError::MissingStopPrice)?;
        require_positive("stop price", stop)?;
    }
    Ok(())
}

/// One normalized request.
///
/// Stop and limit prices are forwarded in either order; the exchange decides
/// when the stop triggers.
pub fn plan(
    intent: &SimpleIntent,
    rules: &SymbolRules,
    rounding: PriceRounding,
    reference: Option<Decimal>,
    run_id: RunId,
) -> Result<Plan, BotError> {
    validate(intent)?;

    let raw_price = if intent.order_type.requires_price() { intent.price } else { None };
    let normalized = rules.normalize(raw_price, intent.quantity, rounding, reference)?;

    let stop_price = match (intent.order_type, intent.stop_price) {
        (OrderType::StopLimit, Some(raw)) => {
            let stop = rules.round_price(raw, rounding, reference);
            if stop <= Decimal::ZERO {
                return Err(PrecisionError::InvalidPrice(stop).into());
            }
            Some(stop)
        }
        _ => None,
    };

    let time_in_force = match intent.order_type {
        OrderType::Market => None,
        OrderType::Limit | OrderType::StopLimit => Some(intent.time_in_force.unwrap_or_default()),
    };

    let request = OrderRequest {
        symbol: intent.symbol.clone(),
        side: intent.side,
        order_type: intent.order_type,
        quantity: normalized.quantity,
        price: normalized.price,
        stop_price,
        time_in_force,
        client_order_id: client_order_id(run_id, 0),
    };

    Ok(Plan { requests: vec![request], interval: Duration::ZERO })
}

fn order_type_label(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
        OrderType::StopLimit => "stop-limit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::btc_rules;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn intent(order_type: OrderType) -> SimpleIntent {
        SimpleIntent {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            order_type,
            quantity: dec!(0.00127),
            price: None,
            stop_price: None,
            time_in_force: None,
        }
    }

    #[test]
    fn market_order_drops_price_and_tif() {
        let mut i = intent(OrderType::Market);
        i.price = Some(dec!(1));
        let plan = plan(&i, &btc_rules(), PriceRounding::Nearest, Some(dec!(110000)), Uuid::new_v4()).unwrap();
        let req = &plan.requests[0];
        assert_eq!(req.quantity, dec!(0.0012));
        assert_eq!(req.price, None);
        assert_eq!(req.time_in_force, None);
    }

    #[test]
    fn limit_order_defaults_to_gtc() {
        let mut i = intent(OrderType::Limit);
        i.price = Some(dec!(108000.04));
        let plan = plan(&i, &btc_rules(), PriceRounding::Nearest, None, Uuid::new_v4()).unwrap();
        let req = &plan.requests[0];
        assert_eq!(req.price, Some(dec!(108000.0)));
        assert_eq!(req.time_in_force, Some(TimeInForce::Gtc));
    }

    #[test]
    fn limit_without_price_is_rejected() {
        let err = validate(&intent(OrderType::Limit)).unwrap_err();
        assert_eq!(err, ValidationError::MissingPrice("limit"));
    }

    #[test]
    fn stop_limit_accepts_either_price_ordering() {
        for (price, stop) in [(dec!(100000), dec!(101000)), (dec!(101000), dec!(100000))] {
            let mut i = intent(OrderType::StopLimit);
            i.side = Side::Sell;
            i.price = Some(price);
            i.stop_price = Some(stop);
            i.time_in_force = Some(TimeInForce::Ioc);
            let plan = plan(&i, &btc_rules(), PriceRounding::Nearest, None, Uuid::new_v4()).unwrap();
            let req = &plan.requests[0];
            assert_eq!(req.price, Some(price));
            assert_eq!(req.stop_price, Some(stop));
            assert_eq!(req.time_in_force, Some(TimeInForce::Ioc));
        }
    }

    #[test]
    fn stop_limit_requires_stop_price() {
        let mut i = intent(OrderType::StopLimit);
        i.price = Some(dec!(100000));
        assert_eq!(validate(&i).unwrap_err(), ValidationError::MissingStopPrice);
    }

    #[test]
    fn small_order_fails_notional() {
        let mut i = intent(OrderType::Limit);
        i.quantity = dec!(0.0001);
        i.price = Some(dec!(40000));
        let err = plan(&i, &btc_rules(), PriceRounding::Nearest, None, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, BotError::Precision(PrecisionError::BelowMinNotional { .. })));
    }
}
