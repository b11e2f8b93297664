//! Encrypted amounts are integers in units of `10^-ENCRYPTED_DECIMALS` tokens.
//!
//! The plaintext ceiling follows from the decimal precision: decryption
//! recovers amounts by a bounded discrete-log search, so the largest amount the
//! system will ever encrypt is fixed here and nowhere else.

use crate::PrimitiveError;

/// Decimal places of the encrypted token system.
pub const ENCRYPTED_DECIMALS: u32 = 2;
/// Largest whole-token amount representable in a ciphertext.
pub const MAX_WHOLE_TOKENS: u64 = 10_000_000;
/// Largest plaintext in base units (inclusive).
pub const MAX_PLAINTEXT: u64 = MAX_WHOLE_TOKENS * 10u64.pow(ENCRYPTED_DECIMALS);

/// Parse a human amount such as `"12.5"` into base units (`1250`).
///
/// More fractional digits than [`ENCRYPTED_DECIMALS`] are rejected instead of
/// being truncated.
pub fn parse_units(s: &str) -> Result<u64, PrimitiveError> {
    let invalid = || PrimitiveError::InvalidAmount(s.to_string());
    let trimmed = s.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > ENCRYPTED_DECIMALS as usize {
        return Err(invalid());
    }

    let scale = 10u64.pow(ENCRYPTED_DECIMALS);
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().map_err(|_| invalid())?
    };
    let frac_units = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = ENCRYPTED_DECIMALS as usize);
        padded.parse::<u64>().map_err(|_| invalid())?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(invalid)
}

/// Render base units with exactly [`ENCRYPTED_DECIMALS`] fractional digits.
pub fn format_units(units: u64) -> String {
    let scale = 10u64.pow(ENCRYPTED_DECIMALS);
    format!(
        "{}.{:0width$}",
        units / scale,
        units % scale,
        width = ENCRYPTED_DECIMALS as usize
    )
}
