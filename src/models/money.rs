//! Amount and currency handling.
//!
//! Amounts travel as decimal strings or JSON numbers and are kept as integer
//! minor units (cents) everywhere else.

use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use serde_json::Value;

use crate::error::AppError;

/// Smallest normalized exponent still worth converting; anything at or above
/// 10^17 major units overflows `i64` cents.
const MIN_SCALE: i64 = -16;

/// Parse a request amount into cents.
///
/// Accepts a JSON number or a numeric string with at most two decimal places.
/// Zero, negative and non-numeric values are rejected with `invalid_amount`.
pub fn parse_amount(value: &Value) -> Result<i64, AppError> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid_amount("Amount must be a number")),
    };

    let amount =
        BigDecimal::from_str(&raw).map_err(|_| invalid_amount("Amount must be a number"))?;
    if amount <= BigDecimal::zero() {
        return Err(invalid_amount("Amount must be greater than zero"));
    }

    // serde_json renders 100.0 for floats; trailing zeros past the cent are harmless.
    let amount = amount.normalized();
    let (_, scale) = amount.as_bigint_and_exponent();
    if scale > 2 {
        return Err(invalid_amount("Amount may have at most two decimal places"));
    }
    if scale < MIN_SCALE {
        return Err(invalid_amount("Amount is too large"));
    }

    (amount * BigDecimal::from(100))
        .to_i64()
        .ok_or_else(|| invalid_amount("Amount is too large"))
}

fn invalid_amount(message: &str) -> AppError {
    AppError::validation("invalid_amount", message)
}

/// Render cents as a two-decimal string, e.g. `10050` → `"100.50"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Upper-case and trim a currency code.
pub fn normalize_currency(currency: &str) -> String {
    currency.trim().to_ascii_uppercase()
}
