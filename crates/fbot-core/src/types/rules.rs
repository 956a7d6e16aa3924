//! Per-symbol trading rules and the rounding arithmetic built on them.
//!
//! Everything here is pure: the async cache that fetches rules from the
//! exchange lives in `fbot-td`. Prices and quantities are `Decimal` so that
//! "exact multiple of the tick size" is an exact check, not an epsilon test.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::enums::PriceRounding;
use crate::error::PrecisionError;

/// Minimum notional assumed when the exchange omits the filter.
pub const DEFAULT_MIN_NOTIONAL: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Immutable trading rules for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRules {
    pub symbol: String,
    /// Minimum price increment (`PRICE_FILTER.tickSize`).
    pub tick_size: Decimal,
    /// Minimum quantity increment (`LOT_SIZE.stepSize`).
    pub step_size: Decimal,
    /// Minimum price × quantity (`MIN_NOTIONAL.notional`).
    pub min_notional: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
}

/// A request's price and quantity after normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub price: Option<Decimal>,
    pub quantity: Decimal,
}

impl SymbolRules {
    /// Round a quantity down to a multiple of `step_size`.
    ///
    /// Never rounds up, so the result never exceeds the requested exposure.
    /// Negative input clamps to zero.
    pub fn floor_quantity(&self, qty: Decimal) -> Decimal {
        floor_to_increment(qty.max(Decimal::ZERO), self.step_size)
    }

    /// Round a price onto the tick grid.
    ///
    /// With [`PriceRounding::Nearest`], an exact half-tick tie moves toward
    /// `reference` (the last traded price); without a reference, ties round
    /// away from zero.
    pub fn round_price(&self, price: Decimal, mode: PriceRounding, reference: Option<Decimal>) -> Decimal {
        round_to_increment(price, self.tick_size, mode, reference)
    }

    /// Check a rounded quantity against `min_qty` / `max_qty`.
    pub fn check_quantity(&self, qty: Decimal) -> Result<(), PrecisionError> {
        if qty <= Decimal::ZERO || qty < self.min_qty || qty > self.max_qty {
            return Err(PrecisionError::QuantityOutOfRange {
                quantity: qty,
                min_qty: self.min_qty,
                max_qty: self.max_qty,
            });
        }
        Ok(())
    }

    /// Check price × quantity against `min_notional`.
    pub fn check_notional(&self, price: Decimal, qty: Decimal) -> Result<(), PrecisionError> {
        let notional = price * qty;
        if notional < self.min_notional {
            return Err(PrecisionError::BelowMinNotional {
                notional,
                min_notional: self.min_notional,
            });
        }
        Ok(())
    }

    /// Turn a raw price/quantity pair into exchange-legal values.
    ///
    /// `reference` is the current market price: it breaks rounding ties and,
    /// for market orders (no `raw_price`), prices the notional check. Without
    /// either price the notional check is skipped.
    pub fn normalize(
        &self,
        raw_price: Option<Decimal>,
        raw_qty: Decimal,
        mode: PriceRounding,
        reference: Option<Decimal>,
    ) -> Result<Normalized, PrecisionError> {
        let quantity = self.floor_quantity(raw_qty);
        self.check_quantity(quantity)?;

        let price = match raw_price {
            Some(raw) => {
                let p = self.round_price(raw, mode, reference);
                if p <= Decimal::ZERO {
                    return Err(PrecisionError::InvalidPrice(p));
                }
                Some(p)
            }
            None => None,
        };

        if let Some(p) = price.or(reference) {
            self.check_notional(p, quantity)?;
        }

        Ok(Normalized { price, quantity })
    }
}

/// Largest multiple of `increment` that is `<= value`.
pub fn floor_to_increment(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }
    ((value / increment).floor() * increment).normalize()
}

/// Round `value` onto a multiple of `increment` using `mode`.
pub fn round_to_increment(
    value: Decimal,
    increment: Decimal,
    mode: PriceRounding,
    reference: Option<Decimal>,
) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }
    let steps = value / increment;
    let floor = steps.floor();
    let rounded = match mode {
        PriceRounding::Down => floor,
        PriceRounding::Up => steps.ceil(),
        PriceRounding::Nearest => {
            let frac = steps - floor;
            let half = Decimal::new(5, 1);
            if frac > half {
                floor + Decimal::ONE
            } else if frac < half {
                floor
            } else {
                match reference {
                    Some(r) if r > value => floor + Decimal::ONE,
                    Some(r) if r < value => floor,
                    _ => steps.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
                }
            }
        }
    };
    (rounded * increment).normalize()
}

/// Whether `value` is an exact multiple of `increment`.
pub fn is_multiple_of(value: Decimal, increment: Decimal) -> bool {
    increment > Decimal::ZERO && (value % increment).is_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rules() -> SymbolRules {
        SymbolRules {
            symbol: "BTCUSDT".into(),
            tick_size: dec!(0.1),
            step_size: dec!(0.001),
            min_notional: dec!(5),
            min_qty: dec!(0.001),
            max_qty: dec!(1000),
        }
    }

    #[test]
    fn default_min_notional_is_five() {
        assert_eq!(DEFAULT_MIN_NOTIONAL, dec!(5));
    }

    #[test]
    fn quantity_rounds_down_never_up() {
        let r = rules();
        assert_eq!(r.floor_quantity(dec!(0.0019)), dec!(0.001));
        assert_eq!(r.floor_quantity(dec!(0.002)), dec!(0.002));
        assert_eq!(r.floor_quantity(dec!(-1)), dec!(0));
    }

    #[test]
    fn floored_quantity_is_multiple_and_not_larger() {
        let steps = [dec!(0.001), dec!(0.0001), dec!(1), dec!(0.5), dec!(0.025)];
        let quantities = [dec!(0), dec!(0.00049), dec!(1.23456789), dec!(7.5), dec!(1234.5678), dec!(0.0249)];
        for step in steps {
            for q in quantities {
                let f = floor_to_increment(q, step);
                assert!(f >= Decimal::ZERO);
                assert!(f <= q, "{f} > {q} for step {step}");
                assert!((f % step).is_zero(), "{f} not a multiple of {step}");
                assert!(q - f < step);
            }
        }
    }

    #[test]
    fn price_rounds_to_nearest_tick() {
        let r = rules();
        assert_eq!(r.round_price(dec!(4000.07), PriceRounding::Nearest, None), dec!(4000.1));
        assert_eq!(r.round_price(dec!(4000.04), PriceRounding::Nearest, None), dec!(4000.0));
        assert_eq!(r.round_price(dec!(4000.07), PriceRounding::Down, None), dec!(4000.0));
        assert_eq!(r.round_price(dec!(4000.01), PriceRounding::Up, None), dec!(4000.1));
    }

    #[test]
    fn price_ties_break_toward_market() {
        let r = rules();
        // Market above: tie rounds up.
        assert_eq!(r.round_price(dec!(4000.05), PriceRounding::Nearest, Some(dec!(4100))), dec!(4000.1));
        // Market below: tie rounds down.
        assert_eq!(r.round_price(dec!(4000.05), PriceRounding::Nearest, Some(dec!(3900))), dec!(4000.0));
        // No market reference: away from zero.
        assert_eq!(r.round_price(dec!(4000.05), PriceRounding::Nearest, None), dec!(4000.1));
    }

    #[test]
    fn normalize_rejects_zero_quantity() {
        let err = rules().normalize(None, dec!(0.0004), PriceRounding::Nearest, None).unwrap_err();
        assert!(matches!(err, PrecisionError::QuantityOutOfRange { .. }));
    }

    #[test]
    fn normalize_rejects_above_max_qty() {
        let err = rules().normalize(None, dec!(1000.5), PriceRounding::Nearest, None).unwrap_err();
        assert!(matches!(err, PrecisionError::QuantityOutOfRange { .. }));
    }

    #[test]
    fn normalize_checks_notional_after_rounding() {
        // 0.0019 floors to 0.001; 0.001 * 4000 = 4 < 5.
        let err = rules()
            .normalize(Some(dec!(4000)), dec!(0.0019), PriceRounding::Nearest, None)
            .unwrap_err();
        assert_eq!(
            err,
            PrecisionError::BelowMinNotional { notional: dec!(4.000), min_notional: dec!(5) }
        );
    }

    #[test]
    fn normalize_market_uses_reference_for_notional() {
        let r = rules();
        assert!(r.normalize(None, dec!(0.001), PriceRounding::Nearest, Some(dec!(1000))).is_err());
        let n = r.normalize(None, dec!(0.001), PriceRounding::Nearest, Some(dec!(110000))).unwrap();
        assert_eq!(n, Normalized { price: None, quantity: dec!(0.001) });
        // No price at all: notional is left to the exchange.
        assert!(r.normalize(None, dec!(0.001), PriceRounding::Nearest, None).is_ok());
    }

    #[test]
    fn normalize_rejects_price_rounding_to_zero() {
        let err = rules().normalize(Some(dec!(0.04)), dec!(1), PriceRounding::Nearest, None).unwrap_err();
        assert_eq!(err, PrecisionError::InvalidPrice(dec!(0)));
    }

    #[test]
    fn multiple_check() {
        assert!(is_multiple_of(dec!(109000), dec!(1)));
        assert!(is_multiple_of(dec!(4000.1), dec!(0.1)));
        assert!(!is_multiple_of(dec!(4000.15), dec!(0.1)));
    }
}
