//! Conversion between human-readable token amounts and raw on-chain units

use ethers::types::{I256, U256};
use ethers::utils::{format_units, parse_units, ParseUnits};

/// Parse a decimal string such as `"0.05"` into the token's smallest unit.
pub fn from_readable(amount: &str, decimals: u32) -> Result<U256, String> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err("amount is empty".to_string());
    }
    if !amount.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err("amount must be an unsigned decimal number".to_string());
    }

    let mut parts = amount.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    if fraction.contains('.') {
        return Err("amount has more than one decimal point".to_string());
    }
    if whole.is_empty() && fraction.is_empty() {
        return Err("amount has no digits".to_string());
    }
    if fraction.len() > decimals as usize {
        return Err(format!(
            "amount has {} fractional digits, token supports {}",
            fraction.len(),
            decimals
        ));
    }

    match parse_units(amount, decimals).map_err(|e| e.to_string())? {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => Err("amount must not be negative".to_string()),
    }
}

/// Format a raw amount with the token's decimals, without trailing zeros.
pub fn to_readable(raw: U256, decimals: u32) -> String {
    match format_units(raw, decimals) {
        Ok(formatted) => trim_fraction(formatted),
        Err(_) => raw.to_string(),
    }
}

/// Signed difference `after - before`, formatted with the token's decimals.
pub fn readable_delta(before: U256, after: U256, decimals: u32) -> String {
    if after >= before {
        format!("+{}", to_readable(after - before, decimals))
    } else {
        format!("-{}", to_readable(before - after, decimals))
    }
}

/// Signed difference `after - before` in raw units.
pub fn raw_delta(before: U256, after: U256) -> I256 {
    if after >= before {
        I256::from_raw(after - before)
    } else {
        -I256::from_raw(before - after)
    }
}

fn trim_fraction(formatted: String) -> String {
    if !formatted.contains('.') {
        return formatted;
    }
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_readable() {
        assert_eq!(
            from_readable("0.05", 18).unwrap(),
            U256::from(50_000_000_000_000_000u64)
        );
        assert_eq!(from_readable("12.5", 6).unwrap(), U256::from(12_500_000u64));
        assert_eq!(from_readable("3", 6).unwrap(), U256::from(3_000_000u64));
    }

    #[test]
    fn test_from_readable_rejects_bad_input() {
        assert!(from_readable("", 18).is_err());
        assert!(from_readable("-1", 18).is_err());
        assert!(from_readable("1.2.3", 18).is_err());
        assert!(from_readable("abc", 18).is_err());
        assert!(from_readable("0.1234567", 6).is_err());
    }

    #[test]
    fn test_to_readable_trims() {
        assert_eq!(to_readable(U256::from(50_000_000_000_000_000u64), 18), "0.05");
        assert_eq!(to_readable(U256::from(12_000_000u64), 6), "12");
        assert_eq!(to_readable(U256::zero(), 6), "0");
    }

    #[test]
    fn test_deltas() {
        let before = U256::from(1_000_000u64);
        let after = U256::from(250_000u64);
        assert_eq!(readable_delta(before, after, 6), "-0.75");
        assert_eq!(readable_delta(after, before, 6), "+0.75");
        assert_eq!(raw_delta(before, after), I256::from(-750_000i64));
    }
}
