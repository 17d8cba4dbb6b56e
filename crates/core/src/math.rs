//! Fixed-point arithmetic matching Morpho Blue's `MathLib` and `SharesMathLib`.
//!
//! Every helper rounds in an explicit direction. Amounts owed to the protocol
//! round up, amounts owed to the user round down.

use alloy::primitives::U256;

/// 1e18
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 1e36, the oracle price scale.
pub const ORACLE_PRICE_SCALE: U256 = U256::from_limbs([0xb34b9f1000000000, 0x00c097ce7bc90715, 0, 0]);

pub const VIRTUAL_ASSETS: U256 = U256::from_limbs([1, 0, 0, 0]);

pub const VIRTUAL_SHARES: U256 = U256::from_limbs([1_000_000, 0, 0, 0]);

/// 0.3e18
pub const LIQUIDATION_CURSOR: U256 = U256::from_limbs([300_000_000_000_000_000, 0, 0, 0]);

/// 1.15e18
pub const MAX_LIQUIDATION_INCENTIVE_FACTOR: U256 =
    U256::from_limbs([1_150_000_000_000_000_000, 0, 0, 0]);

/// `x * y / d` rounded down. A zero denominator yields `U256::MAX`.
#[inline(always)]
pub fn mul_div_down(x: U256, y: U256, d: U256) -> U256 {
    if d.is_zero() {
        return U256::MAX;
    }
    (x * y) / d
}

/// `x * y / d` rounded up. A zero denominator yields `U256::MAX`.
#[inline(always)]
pub fn mul_div_up(x: U256, y: U256, d: U256) -> U256 {
    if d.is_zero() {
        return U256::MAX;
    }
    (x * y + (d - U256::from(1))) / d
}

#[inline(always)]
pub fn w_mul_down(x: U256, y: U256) -> U256 {
    mul_div_down(x, y, WAD)
}

#[inline(always)]
pub fn w_div_down(x: U256, y: U256) -> U256 {
    mul_div_down(x, WAD, y)
}

#[inline(always)]
pub fn w_div_up(x: U256, y: U256) -> U256 {
    mul_div_up(x, WAD, y)
}

/// Three-term Taylor expansion of `e^(x*n) - 1`, used to compound interest.
pub fn w_taylor_compounded(x: U256, n: U256) -> U256 {
    let first_term = x * n;
    let second_term = mul_div_down(first_term, first_term, U256::from(2) * WAD);
    let third_term = mul_div_down(second_term, first_term, U256::from(3) * WAD);
    first_term + second_term + third_term
}

#[inline(always)]
pub fn to_shares_down(assets: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_down(assets, total_shares + VIRTUAL_SHARES, total_assets + VIRTUAL_ASSETS)
}

#[inline(always)]
pub fn to_shares_up(assets: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_up(assets, total_shares + VIRTUAL_SHARES, total_assets + VIRTUAL_ASSETS)
}

#[inline(always)]
pub fn to_assets_down(shares: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_down(shares, total_assets + VIRTUAL_ASSETS, total_shares + VIRTUAL_SHARES)
}

#[inline(always)]
pub fn to_assets_up(shares: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_up(shares, total_assets + VIRTUAL_ASSETS, total_shares + VIRTUAL_SHARES)
}

/// Lossy conversion for display and USD estimates.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}

/// Token amount to whole units, e.g. `1_500_000` at 6 decimals is `1.5`.
pub fn to_units_f64(amount: U256, decimals: u8) -> f64 {
    u256_to_f64(amount) / 10f64.powi(decimals as i32)
}

/// Convert WAD (18 decimals) to f64.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    to_units_f64(wad, 18)
}
