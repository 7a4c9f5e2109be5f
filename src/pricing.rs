//! Pricing engine.
//!
//! Pure computation over line items and an optional coupon; no lookups,
//! no persistence. Callers resolve the coupon themselves and pass the
//! evaluation instant so expiry checks stay deterministic in tests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::aggregates::Coupon;
use crate::domain::value_objects::Money;
use crate::error::{Result, StoreError};

/// One priceable line: a unit price and a quantity.
#[derive(Clone, Debug)]
pub struct PricedLine {
    pub unit_price: Money,
    pub quantity: u32,
}

/// Result of pricing a set of lines.
#[derive(Clone, Debug, PartialEq)]
pub struct Totals {
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

/// Prices `lines` with an optional percentage coupon.
///
/// The discount is rounded to two decimal places and the total is clamped
/// at zero, so `total <= subtotal` and `total >= 0` hold by construction.
pub fn price(
    lines: &[PricedLine],
    coupon: Option<&Coupon>,
    currency: &str,
    now: DateTime<Utc>,
) -> Result<Totals> {
    let subtotal = lines.iter().try_fold(Money::zero(currency), |acc, line| {
        acc.add(&line.unit_price.multiply(line.quantity))
    })?;

    let Some(coupon) = coupon else {
        return Ok(Totals {
            discount: Money::zero(currency),
            total: subtotal.clone(),
            subtotal,
        });
    };

    coupon.ensure_usable(now)?;

    let discount_amount =
        (subtotal.amount() * coupon.percent_off() / Decimal::from(100)).round_dp(2);
    let total_amount = (subtotal.amount() - discount_amount).max(Decimal::ZERO);

    Ok(Totals {
        discount: Money::new(discount_amount, currency),
        total: Money::new(total_amount, currency),
        subtotal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn lines_of(unit: Decimal, qty: u32) -> Vec<PricedLine> {
        vec![PricedLine {
            unit_price: Money::usd(unit),
            quantity: qty,
        }]
    }

    fn coupon(pct: Decimal, days_from_now: i64) -> Coupon {
        Coupon::create("TEST", pct, Utc::now() + Duration::days(days_from_now))
    }

    #[test]
    fn test_no_coupon_total_equals_subtotal() {
        let totals = price(&lines_of(dec!(7.50), 3), None, "USD", Utc::now()).unwrap();
        assert_eq!(totals.subtotal.amount(), dec!(22.50));
        assert_eq!(totals.discount.amount(), Decimal::ZERO);
        assert_eq!(totals.total, totals.subtotal);
    }

    #[test]
    fn test_twenty_percent_off_two_tens() {
        // 2 x $10 with 20% off: 20 / 4 / 16
        let c = coupon(dec!(20), 1);
        let totals = price(&lines_of(dec!(10), 2), Some(&c), "USD", Utc::now()).unwrap();
        assert_eq!(totals.subtotal.amount(), dec!(20));
        assert_eq!(totals.discount.amount(), dec!(4.00));
        assert_eq!(totals.total.amount(), dec!(16.00));
    }

    #[test]
    fn test_full_discount_clamps_at_zero() {
        let c = coupon(dec!(100), 1);
        let totals = price(&lines_of(dec!(9.99), 1), Some(&c), "USD", Utc::now()).unwrap();
        assert_eq!(totals.total.amount(), Decimal::ZERO);
    }

    #[test]
    fn test_expired_coupon_fails() {
        let c = coupon(dec!(20), -1);
        assert!(matches!(
            price(&lines_of(dec!(10), 1), Some(&c), "USD", Utc::now()),
            Err(StoreError::ExpiredCoupon(_))
        ));
    }

    #[test]
    fn test_percentage_out_of_range_fails() {
        let c = coupon(dec!(101), 1);
        assert!(matches!(
            price(&lines_of(dec!(10), 1), Some(&c), "USD", Utc::now()),
            Err(StoreError::InvalidDiscount(_))
        ));
    }

    #[test]
    fn test_empty_lines_price_to_zero() {
        let totals = price(&[], None, "USD", Utc::now()).unwrap();
        assert!(totals.subtotal.is_zero());
    }
}
