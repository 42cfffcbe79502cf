//! Fixed-point money helpers.
//!
//! All monetary values are `rust_decimal::Decimal` carried at two decimal places.
//! Floating point is never used for amounts.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::{DomainError, DomainResult};

/// Number of decimal places money is quantized to.
pub const MONEY_SCALE: u32 = 2;

/// `100`, the denominator of every percentage.
pub const HUNDRED: Decimal = dec!(100);

/// Largest magnitude a stored amount may have (`NUMERIC(12,2)`).
pub const MAX_MONEY: Decimal = dec!(9999999999.99);

/// Quantize to two decimal places using banker's rounding (half-to-even).
pub fn quantize(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven);
    // Normalize the scale so 94.5 and 94.50 render identically.
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// `amount * percent / 100`, unrounded.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / HUNDRED
}

/// Clamp negative values to zero.
pub fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

pub fn ensure_positive(field: &str, value: Decimal) -> DomainResult<()> {
    if value <= Decimal::ZERO {
        return Err(DomainError::field(field, format!("{field} must be a positive amount")));
    }
    Ok(())
}

pub fn ensure_non_negative(field: &str, value: Decimal) -> DomainResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DomainError::field(field, format!("{field} must not be negative")));
    }
    Ok(())
}

/// Percentages are accepted in the closed range `0..=100`.
pub fn ensure_percent(field: &str, value: Decimal) -> DomainResult<()> {
    if value < Decimal::ZERO || value > HUNDRED {
        return Err(DomainError::field(
            field,
            format!("{field} must be between 0 and 100"),
        ));
    }
    Ok(())
}

/// Money inputs may carry at most two decimal places.
pub fn ensure_money_scale(field: &str, value: Decimal) -> DomainResult<()> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(DomainError::field(
            field,
            format!("{field} must have at most {MONEY_SCALE} decimal places"),
        ));
    }
    Ok(())
}

/// Amounts must fit the stored column; larger values would also overflow
/// decimal arithmetic once multiplied or summed.
pub fn ensure_money_range(field: &str, value: Decimal) -> DomainResult<()> {
    if value.abs() > MAX_MONEY {
        return Err(DomainError::field(
            field,
            format!("{field} must not exceed {MAX_MONEY}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn quantize_rounds_half_to_even() {
        assert_eq!(quantize(dec!(2.345)), dec!(2.34));
        assert_eq!(quantize(dec!(2.355)), dec!(2.36));
        assert_eq!(quantize(dec!(94.5)).to_string(), "94.50");
    }

    #[test]
    fn percent_helpers() {
        assert_eq!(percent_of(dec!(100.00), dec!(10)), dec!(10));
        assert_eq!(non_negative(dec!(-0.01)), Decimal::ZERO);
        assert!(ensure_percent("tax_percent", dec!(100)).is_ok());
        assert!(ensure_percent("tax_percent", dec!(100.01)).is_err());
        assert!(ensure_positive("amount", Decimal::ZERO).is_err());
        assert!(ensure_non_negative("paid_amount", Decimal::ZERO).is_ok());
        assert!(ensure_money_scale("amount", dec!(1.234)).is_err());
        assert!(ensure_money_scale("amount", dec!(1.230)).is_ok());
    }

    #[test]
    fn money_range_matches_the_column() {
        assert!(ensure_money_range("amount", MAX_MONEY).is_ok());
        assert!(ensure_money_range("amount", -MAX_MONEY).is_ok());
        let err = ensure_money_range("unit_price", "39614081257132168796771975168".parse().unwrap()).unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: Some(ref f), .. } if f == "unit_price"));
    }

    proptest! {
        #[test]
        fn quantize_is_idempotent_and_two_places(units in -10_000_000i64..10_000_000, scale in 0u32..6) {
            let value = Decimal::new(units, scale);
            let once = quantize(value);
            prop_assert_eq!(once.scale(), MONEY_SCALE);
            prop_assert_eq!(quantize(once), once);
            prop_assert!((once - value).abs() <= dec!(0.005));
        }
    }
}
