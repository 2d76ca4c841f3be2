//! Canonical decimal-string arithmetic for token amounts.
//!
//! Amounts cross every module boundary as canonical decimal strings: ASCII
//! digits only, no sign, no exponent form, no leading zeros except the
//! literal `"0"`. Internally they are `u128`. Every balance credit/debit and
//! supply comparison in the indexer goes through this module; binary floating
//! point never touches protocol amounts.

use std::cmp::Ordering;

/// Hard protocol cap on any single amount: 10^27.
pub const MAX_AMOUNT: u128 = 1_000_000_000_000_000_000_000_000_000;

/// Parses a canonical decimal string. Rejects empty strings, non-digit
/// characters, and non-canonical leading zeros. Intermediate results (e.g.
/// a proposed total supply) may exceed [MAX_AMOUNT], so the protocol cap is
/// not enforced here; see [is_valid_amount].
pub fn parse_amount(value: &str) -> Result<u128, String> {
    if value.is_empty() {
        return Err("amount is empty".to_string());
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("amount is not a canonical integer: {value}"));
    }
    if value.len() > 1 && value.starts_with('0') {
        return Err(format!("amount has leading zeros: {value}"));
    }
    value
        .parse::<u128>()
        .map_err(|e| format!("amount out of range: {value}: {e}"))
}

/// True when `value` is a canonical, strictly positive amount within the
/// protocol cap. Zero-valued operations are never valid.
pub fn is_valid_amount(value: &str) -> bool {
    match parse_amount(value) {
        Ok(parsed) => parsed > 0 && parsed <= MAX_AMOUNT,
        Err(_) => false,
    }
}

pub fn compare_amounts(a: &str, b: &str) -> Result<Ordering, String> {
    let a = parse_amount(a)?;
    let b = parse_amount(b)?;
    Ok(a.cmp(&b))
}

pub fn is_amount_greater_than(a: &str, b: &str) -> Result<bool, String> {
    Ok(compare_amounts(a, b)? == Ordering::Greater)
}

pub fn is_amount_greater_equal(a: &str, b: &str) -> Result<bool, String> {
    Ok(compare_amounts(a, b)? != Ordering::Less)
}

/// Adds two canonical amounts. The sum may exceed [MAX_AMOUNT]; callers
/// compare it against a max supply, so the headroom is intentional.
pub fn add_amounts(a: &str, b: &str) -> Result<String, String> {
    let a = parse_amount(a)?;
    let b = parse_amount(b)?;
    let sum = a
        .checked_add(b)
        .ok_or_else(|| format!("amount addition overflow: {a} + {b}"))?;
    Ok(sum.to_string())
}

/// Subtracts `b` from `a`, failing when `a < b`.
pub fn subtract_amounts(a: &str, b: &str) -> Result<String, String> {
    let a = parse_amount(a)?;
    let b = parse_amount(b)?;
    let difference = a
        .checked_sub(b)
        .ok_or_else(|| format!("amount subtraction underflow: {a} - {b}"))?;
    Ok(difference.to_string())
}
