//! Tiered pricing for quota topups.
//!
//! Pure integer arithmetic in whole currency units; the discount applies to
//! the whole quantity, not marginally.

use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingBreakdown {
    pub quantity: i64,
    pub unit_price: i64,
    pub subtotal: i64,
    pub discount_percent: i32,
    pub discount_amount: i64,
    pub final_amount: i64,
}

/// Discount tier for a given quantity, in whole percent.
pub fn discount_percent(quantity: i64) -> i32 {
    match quantity {
        q if q >= 20 => 30,
        q if q >= 11 => 25,
        q if q >= 6 => 20,
        5 => 12,
        _ => 0,
    }
}

pub fn calculate(quantity: i64, unit_price: i64) -> Result<PricingBreakdown, AppError> {
    if quantity <= 0 {
        return Err(AppError::InvalidQuantity(quantity));
    }
    if unit_price <= 0 {
        return Err(AppError::BadRequest(format!(
            "unit price must be positive, got {unit_price}"
        )));
    }

    // Quantities large enough to overflow the subtotal are nonsense input,
    // not an internal error; reject them like any other bad quantity.
    let subtotal = quantity
        .checked_mul(unit_price)
        .ok_or(AppError::InvalidQuantity(quantity))?;
    let percent = discount_percent(quantity);
    let discount_amount = subtotal
        .checked_mul(i64::from(percent))
        .ok_or(AppError::InvalidQuantity(quantity))?
        / 100;
    let final_amount = subtotal - discount_amount;

    Ok(PricingBreakdown {
        quantity,
        unit_price,
        subtotal,
        discount_percent: percent,
        discount_amount,
        final_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_discount_below_five() {
        let quote = calculate(4, 1000).unwrap();
        assert_eq!(quote.discount_percent, 0);
        assert_eq!(quote.subtotal, 4000);
        assert_eq!(quote.discount_amount, 0);
        assert_eq!(quote.final_amount, 4000);
    }

    #[test]
    fn test_twelve_percent_at_exactly_five() {
        let quote = calculate(5, 1000).unwrap();
        assert_eq!(quote.discount_percent, 12);
        assert_eq!(quote.subtotal, 5000);
        assert_eq!(quote.discount_amount, 600);
        assert_eq!(quote.final_amount, 4400);
    }

    #[test]
    fn test_twenty_percent_tier() {
        for quantity in [6, 10] {
            let quote = calculate(quantity, 1000).unwrap();
            assert_eq!(quote.discount_percent, 20, "quantity {quantity}");
        }
    }

    #[test]
    fn test_twenty_five_percent_tier() {
        for quantity in [11, 15, 19] {
            let quote = calculate(quantity, 1000).unwrap();
            assert_eq!(quote.discount_percent, 25, "quantity {quantity}");
        }
    }

    #[test]
    fn test_thirty_percent_tier() {
        for quantity in [20, 25, 100] {
            let quote = calculate(quantity, 1000).unwrap();
            assert_eq!(quote.discount_percent, 30, "quantity {quantity}");
        }
    }

    #[test]
    fn test_amounts_balance_exactly() {
        for quantity in 1..=50 {
            let quote = calculate(quantity, 5000).unwrap();
            assert_eq!(quote.final_amount, quote.subtotal - quote.discount_amount);
            assert_eq!(quote.subtotal, quantity * 5000);
        }
    }

    #[test]
    fn test_end_to_end_scenario_amounts() {
        // quantity 5 at unit price 5000: 12% of 25000 is 3000
        let quote = calculate(5, 5000).unwrap();
        assert_eq!(quote.subtotal, 25000);
        assert_eq!(quote.discount_amount, 3000);
        assert_eq!(quote.final_amount, 22000);
    }

    #[test]
    fn test_zero_and_negative_quantity_rejected() {
        assert!(matches!(calculate(0, 1000), Err(AppError::InvalidQuantity(0))));
        assert!(matches!(
            calculate(-3, 1000),
            Err(AppError::InvalidQuantity(-3))
        ));
    }

    #[test]
    fn test_extreme_quantity_rejected_instead_of_overflowing() {
        assert!(matches!(
            calculate(i64::MAX, 5000),
            Err(AppError::InvalidQuantity(_))
        ));
        // A representable subtotal can still overflow the discount step.
        assert!(calculate(i64::MAX / 100, 99).is_err());
    }

    #[test]
    fn test_non_positive_unit_price_rejected() {
        assert!(calculate(5, 0).is_err());
        assert!(calculate(5, -100).is_err());
    }
}
