//! Prices are stored as integer cents and exchanged as decimal amounts.

use super::error::DomainError;

const CENTS_PER_UNIT: f64 = 100.0;
/// Largest accepted amount, well inside the exact range of `f64`.
const MAX_AMOUNT: f64 = 1_000_000_000.0;

pub fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / CENTS_PER_UNIT
}

/// Convert a decimal amount to cents, rounding half away from zero.
pub fn amount_to_cents(amount: f64, field: &str) -> Result<i64, DomainError> {
    if !amount.is_finite() {
        return Err(DomainError::validation(format!("{field} must be a number")));
    }
    if amount < 0.0 {
        return Err(DomainError::validation(format!("{field} must not be negative")));
    }
    if amount > MAX_AMOUNT {
        return Err(DomainError::validation(format!("{field} is too large")));
    }
    Ok((amount * CENTS_PER_UNIT).round() as i64)
}
