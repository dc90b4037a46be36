//! In-game money amounts: `10,000`, `2.5M`, `1.5b`, `3T`.
//!
//! The same rule is used for payment notices read from the chat log, for
//! `/pay` commands and for wager stakes.

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid amount: empty input")]
    Empty,
    #[error("invalid amount: '{0}'")]
    Invalid(String),
    #[error("invalid amount: '{0}' overflows")]
    Overflow(String),
}

/// Multiplier for a magnitude suffix (case-insensitive).
fn suffix_multiplier(c: char) -> Option<i64> {
    match c.to_ascii_uppercase() {
        'K' => Some(1_000),
        'M' => Some(1_000_000),
        'B' => Some(1_000_000_000),
        'T' => Some(1_000_000_000_000),
        _ => None,
    }
}

/// Parse an amount string.
///
/// Thousands separators are stripped, then a trailing K/M/B/T scales the
/// numeric prefix by 10^3/10^6/10^9/10^12. Anything else must be a plain
/// decimal. A failed parse is always an error, never zero.
pub fn parse_amount(input: &str) -> Result<Decimal, AmountError> {
    let cleaned: String = input.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Err(AmountError::Empty);
    }

    let (digits, multiplier) = match cleaned.chars().last().and_then(suffix_multiplier) {
        Some(m) => (&cleaned[..cleaned.len() - 1], m),
        None => (cleaned.as_str(), 1),
    };

    // Decimal::from_str accepts a leading sign and exponents; only plain digits are valid here.
    let numeric = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits.chars().any(|c| c.is_ascii_digit());
    if !numeric {
        return Err(AmountError::Invalid(input.to_string()));
    }

    let value = Decimal::from_str(digits).map_err(|_| AmountError::Invalid(input.to_string()))?;
    value
        .checked_mul(Decimal::from(multiplier))
        .map(|v| v.normalize())
        .ok_or_else(|| AmountError::Overflow(input.to_string()))
}

/// Render an amount for an in-game command: no separators, no suffix.
pub fn format_plain(amount: Decimal) -> String {
    amount.normalize().to_string()
}
