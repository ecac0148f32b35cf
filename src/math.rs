//! Fixed-point helpers over `U256`.
//!
//! Rates are WAD-scaled (1e18 = 100%). Division by zero yields zero so
//! that empty pools and empty strategies report a zero rate instead of
//! failing.

use rust_decimal::Decimal;

use crate::types::{MAX_BPS, U256, WAD};

/// `a * b / denominator`, rounded down.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::ZERO;
    }
    a.saturating_mul(b) / denominator
}

/// `a * b / denominator`, rounded up.
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::ZERO;
    }
    let product = a.saturating_mul(b);
    let quotient = product / denominator;
    if (product % denominator).is_zero() {
        quotient
    } else {
        quotient + U256::from(1u8)
    }
}

/// `a * b / denominator`, rounded half up.
pub fn mul_div_round(a: U256, b: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::ZERO;
    }
    let half = denominator / U256::from(2u8);
    a.saturating_mul(b).saturating_add(half) / denominator
}

/// WAD multiplication, rounded down.
pub fn w_mul(a: U256, b: U256) -> U256 {
    mul_div(a, b, WAD)
}

/// WAD division, rounded down.
pub fn w_div(a: U256, b: U256) -> U256 {
    mul_div(a, WAD, b)
}

/// `amount * bps / 10_000`.
pub fn bps_of(amount: U256, bps: u64) -> U256 {
    mul_div(amount, U256::from(bps), MAX_BPS)
}

/// Relative distance of `a` and `b` is at most `bps` basis points of the larger.
pub fn within_bps(a: U256, b: U256, bps: u64) -> bool {
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    (hi - lo).saturating_mul(MAX_BPS) <= hi.saturating_mul(U256::from(bps))
}

/// A WAD rate as a percentage, e.g. `5e16` → `5.00`.
pub fn apr_percent(apr: U256) -> Decimal {
    to_decimal(apr, 16)
}

/// A token amount in whole units for display.
pub fn to_decimal(amount: U256, decimals: u8) -> Decimal {
    let raw = u128::try_from(amount).unwrap_or(u128::MAX);
    i128::try_from(raw)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, u32::from(decimals)).ok())
        .map(|d| d.normalize())
        .unwrap_or(Decimal::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
