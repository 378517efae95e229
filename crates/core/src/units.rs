//! Decimal normalization for on-chain integer amounts.
//!
//! Three views of the same raw amount are used:
//! - whole units (integer division by `10^decimals`) for price edges
//! - exact normalized `f64` for shares, owned amounts and valuations
//! - 4-digit round-half-up values, applied only when presenting results

use alloy::primitives::utils::parse_units;
use alloy::primitives::U256;

/// Fractional digits kept for display.
pub const DISPLAY_DECIMALS: i32 = 4;

/// 2^64 as f64, for limb recombination
const LIMB_BASE: f64 = 18_446_744_073_709_551_616.0;

/// `10^exp` as U256.
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Amount in whole token units, sub-unit precision discarded.
#[inline(always)]
pub fn whole_units(raw: U256, decimals: u8) -> U256 {
    raw / pow10(decimals)
}

/// Lossy U256 to f64 conversion through the four limbs.
#[inline(always)]
pub fn to_f64(value: U256) -> f64 {
    if value <= U256::from(u128::MAX) {
        let v: u128 = value.to();
        return v as f64;
    }
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * LIMB_BASE + *limb as f64)
}

/// Raw amount scaled to decimal units without rounding.
///
/// The whole and fractional parts are converted separately so that large
/// 18-decimal balances keep their fractional digits.
pub fn normalize(raw: U256, decimals: u8) -> f64 {
    let scale = pow10(decimals);
    let whole = raw / scale;
    let frac = raw % scale;
    to_f64(whole) + to_f64(frac) / to_f64(scale)
}

/// Round to [`DISPLAY_DECIMALS`] fractional digits, half-up.
pub fn round_display(value: f64) -> f64 {
    let factor = 10f64.powi(DISPLAY_DECIMALS);
    (value * factor).round() / factor
}

/// Exact decimal string of a raw amount, trailing zeros trimmed.
pub fn format_units(raw: U256, decimals: u8) -> String {
    let scale = pow10(decimals);
    let whole = raw / scale;
    let frac = raw % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Parse a decimal amount such as `"500"` or `"1.0"` into raw units.
pub fn parse_amount(amount: &str, decimals: u8) -> anyhow::Result<U256> {
    let parsed = parse_units(amount.trim(), decimals)
        .map_err(|e| anyhow::anyhow!("invalid amount `{amount}`: {e}"))?;
    Ok(parsed.get_absolute())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETHER: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_whole_units_truncates() {
        let raw = U256::from(1_999_999u64); // 1.999999 USDC
        assert_eq!(whole_units(raw, 6), U256::from(1u64));
        assert_eq!(whole_units(U256::from(999u64), 6), U256::ZERO);
    }

    #[test]
    fn test_normalize_keeps_fraction() {
        let raw = U256::from(1_234_500_000_000_000_000u128);
        assert!((normalize(raw, 18) - 1.2345).abs() < 1e-12);

        // 10 million tokens at 18 decimals is well beyond u64
        let large = U256::from(10_000_000u128 * ETHER + ETHER / 4);
        assert!((normalize(large, 18) - 10_000_000.25).abs() < 1e-6);
    }

    #[test]
    fn test_to_f64_beyond_u128() {
        let big = U256::from(u128::MAX) + U256::from(1u64);
        let expected = 2f64.powi(128);
        assert!((to_f64(big) - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn test_round_display_half_up() {
        assert_eq!(round_display(1.23456), 1.2346);
        assert_eq!(round_display(1.23454), 1.2345);
        assert_eq!(round_display(0.00004), 0.0);
        assert_eq!(round_display(2.0), 2.0);
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(ETHER / 2), 18), "0.5");
        assert_eq!(format_units(U256::from(3 * ETHER), 18), "3");
        assert_eq!(format_units(U256::from(1_000_001u64), 6), "1.000001");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("500", 18).unwrap(), U256::from(500 * ETHER));
        assert_eq!(parse_amount(" 1.0 ", 18).unwrap(), U256::from(ETHER));
        assert!(parse_amount("lots", 18).is_err());
    }
}
