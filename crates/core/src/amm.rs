//! Constant-product (x * y = k) pool arithmetic on raw integer amounts.

use alloy::primitives::U256;

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Output amount for `amount_in` against the given reserves, net of the pool fee.
///
/// formula: dy = y * dx * (1 - fee) / (x + dx * (1 - fee))
///
/// Returns `None` when a reserve is zero or an intermediate product overflows.
pub fn get_amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u16,
) -> Option<U256> {
    if amount_in.is_zero() {
        return Some(U256::ZERO);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return None;
    }

    let fee_factor = U256::from(BPS_DENOMINATOR.checked_sub(u64::from(fee_bps))?);
    let amount_in_with_fee = amount_in.checked_mul(fee_factor)?;
    let numerator = amount_in_with_fee.checked_mul(reserve_out)?;
    let denominator = reserve_in
        .checked_mul(U256::from(BPS_DENOMINATOR))?
        .checked_add(amount_in_with_fee)?;

    Some(numerator / denominator)
}

/// Amount of the counter-asset matching `amount_a` at the current pool ratio.
///
/// formula: amount_b = amount_a * reserve_b / reserve_a
pub fn quote(amount_a: U256, reserve_a: U256, reserve_b: U256) -> Option<U256> {
    if reserve_a.is_zero() || reserve_b.is_zero() {
        return None;
    }
    Some(amount_a.checked_mul(reserve_b)? / reserve_a)
}

/// Minimum acceptable output after subtracting the slippage tolerance.
///
/// The tolerance itself is floor-rounded, so the result never exceeds
/// `expected` and stays strictly positive whenever `expected` is positive
/// and `slippage_bps` is below 100%.
pub fn min_acceptable(expected: U256, slippage_bps: u16) -> U256 {
    let tolerance =
        expected.saturating_mul(U256::from(slippage_bps)) / U256::from(BPS_DENOMINATOR);
    expected.saturating_sub(tolerance)
}
