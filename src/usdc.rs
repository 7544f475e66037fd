//! Fixed-point USDC amounts
//!
//! Amounts are kept as raw token units (6 decimals) in `U256` and only turned
//! into decimal strings at the serialization boundary. Parsing is exact, so a
//! value read back from a published report equals the value that was written.

use alloy_primitives::U256;
use anyhow::{Context, Result};

pub const USDC_DECIMALS: usize = 6;
const UNIT: u64 = 1_000_000;

/// Format raw units as a decimal string with trailing zeros trimmed.
///
/// `100_000_000` -> `"100"`, `1_500_000` -> `"1.5"`, `1` -> `"0.000001"`.
pub fn format_usdc(raw: U256) -> String {
    let unit = U256::from(UNIT);
    let whole = raw / unit;
    let frac = raw % unit;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = USDC_DECIMALS);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Parse a decimal USDC string back into raw units.
pub fn parse_usdc(s: &str) -> Result<U256> {
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        anyhow::bail!("Invalid USDC amount: {:?}", s);
    }
    if frac.len() > USDC_DECIMALS || !frac.bytes().all(|b| b.is_ascii_digit()) {
        anyhow::bail!("Invalid USDC amount (more than 6 decimals?): {:?}", s);
    }

    let whole: U256 = whole
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid USDC amount {:?}: {}", s, e))?;
    let frac_padded = format!("{:0<width$}", frac, width = USDC_DECIMALS);
    let frac: U256 = frac_padded
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid USDC amount {:?}: {}", s, e))?;

    whole
        .checked_mul(U256::from(UNIT))
        .and_then(|w| w.checked_add(frac))
        .with_context(|| format!("USDC amount overflows: {:?}", s))
}

/// Signed percentage change from `previous` to `current`, two decimals.
///
/// `None` when `previous` is zero. Computed in hundredths of a percent with
/// integer arithmetic, rounding half away from zero; only the final result is
/// converted to `f64`.
pub fn pct_change(current: U256, previous: U256) -> Option<f64> {
    if previous.is_zero() {
        return None;
    }
    let (negative, diff) = if current >= previous {
        (false, current - previous)
    } else {
        (true, previous - current)
    };

    // hundredths of a percent: diff * 10_000 / previous, rounded half up
    let scaled = diff.saturating_mul(U256::from(20_000u64));
    let hundredths = (scaled / previous + U256::from(1u64)) / U256::from(2u64);

    let hundred = U256::from(100u64);
    let text = format!(
        "{}{}.{:0>2}",
        if negative && !hundredths.is_zero() { "-" } else { "" },
        hundredths / hundred,
        (hundredths % hundred).to_string()
    );
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc(s: &str) -> U256 {
        parse_usdc(s).unwrap()
    }

    #[test]
    fn test_format() {
        assert_eq!(format_usdc(U256::ZERO), "0");
        assert_eq!(format_usdc(U256::from(100_000_000u64)), "100");
        assert_eq!(format_usdc(U256::from(1_500_000u64)), "1.5");
        assert_eq!(format_usdc(U256::from(1u64)), "0.000001");
        assert_eq!(format_usdc(U256::from(123_456_789u64)), "123.456789");
    }

    #[test]
    fn test_parse() {
        assert_eq!(usdc("100"), U256::from(100_000_000u64));
        assert_eq!(usdc("0.000001"), U256::from(1u64));
        assert_eq!(usdc("1.5"), U256::from(1_500_000u64));
        assert!(parse_usdc("1.0000001").is_err());
        assert!(parse_usdc("-1").is_err());
        assert!(parse_usdc("").is_err());
        assert!(parse_usdc(".5").is_err());
        assert!(parse_usdc("1e6").is_err());
    }

    #[test]
    fn test_parse_is_exact_at_large_magnitudes() {
        let raw = U256::from(9_007_199_254_740_993_123_457u128);
        assert_eq!(parse_usdc(&format_usdc(raw)).unwrap(), raw);
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(pct_change(usdc("150"), usdc("100")), Some(50.0));
        assert_eq!(pct_change(usdc("50"), usdc("100")), Some(-50.0));
        assert_eq!(pct_change(usdc("100"), usdc("100")), Some(0.0));
        assert_eq!(pct_change(usdc("100"), U256::ZERO), None);
        assert_eq!(pct_change(U256::ZERO, usdc("3")), Some(-100.0));
        // 1/3 -> 33.333.. -> 33.33, 2/3 -> 66.666.. -> 66.67
        assert_eq!(pct_change(usdc("4"), usdc("3")), Some(33.33));
        assert_eq!(pct_change(usdc("5"), usdc("3")), Some(66.67));
        assert_eq!(pct_change(usdc("1"), usdc("3")), Some(-66.67));
    }

    #[test]
    fn test_pct_change_matches_float_reference() {
        let cases: [(u64, u64); 6] = [
            (123_456_789, 98_765_432),
            (1, 7),
            (999_999_999_999, 3),
            (5_000_000, 12_345_678),
            (77_777_777, 77_777_778),
            (10_000_000_000_000, 9_999_999_999_999),
        ];
        for (this, prev) in cases {
            let reference = (this as f64 - prev as f64) / prev as f64 * 100.0;
            let reference = (reference * 100.0).round() / 100.0;
            let actual = pct_change(U256::from(this), U256::from(prev)).unwrap();
            assert!(
                (actual - reference).abs() < 0.011,
                "{} vs {} for {}/{}",
                actual,
                reference,
                this,
                prev
            );
        }
    }
}
