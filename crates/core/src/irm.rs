//! Adaptive curve interest rate model.
//!
//! Signed arithmetic truncates toward zero, like Solidity's `int256` division,
//! so results match `AdaptiveCurveIrm.borrowRateView` to the wei.

use alloy::primitives::{I256, U256};

use crate::math::w_div_down;

const WAD: I256 = I256::from_raw(U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]));

pub const CURVE_STEEPNESS: I256 = I256::from_raw(U256::from_limbs([4_000_000_000_000_000_000, 0, 0, 0]));

/// 50e18 / 365 days
pub const ADJUSTMENT_SPEED: I256 = I256::from_raw(U256::from_limbs([1_585_489_599_188, 0, 0, 0]));

/// 0.9e18
pub const TARGET_UTILIZATION: I256 = I256::from_raw(U256::from_limbs([900_000_000_000_000_000, 0, 0, 0]));

/// 4% APR per second.
pub const INITIAL_RATE_AT_TARGET: I256 = I256::from_raw(U256::from_limbs([1_268_391_679, 0, 0, 0]));

/// 0.1% APR per second.
pub const MIN_RATE_AT_TARGET: I256 = I256::from_raw(U256::from_limbs([31_709_791, 0, 0, 0]));

/// 200% APR per second.
pub const MAX_RATE_AT_TARGET: I256 = I256::from_raw(U256::from_limbs([63_419_583_967, 0, 0, 0]));

const LN_2_INT: I256 = I256::from_raw(U256::from_limbs([693_147_180_559_945_309, 0, 0, 0]));

/// Absolute value of ln(1e-18) in WAD; below its negation `w_exp` is 0.
const LN_WEI_INT_ABS: I256 = I256::from_raw(U256::from_limbs([0x3f2fa8f6da5b9d28, 0x2, 0, 0]));

const WEXP_UPPER_BOUND: I256 = I256::from_raw(U256::from_limbs([0x168fd0946fc0415f, 0x5, 0, 0]));

/// `w_exp(WEXP_UPPER_BOUND)`
const WEXP_UPPER_VALUE: I256 = I256::from_raw(U256::from_limbs([0, 0, 0x31d81650c7d88b80, 0x9]));

#[inline(always)]
fn int(value: u64) -> I256 {
    I256::from_raw(U256::from(value))
}

#[inline(always)]
fn w_mul_to_zero(x: I256, y: I256) -> I256 {
    x * y / WAD
}

#[inline(always)]
fn w_div_to_zero(x: I256, y: I256) -> I256 {
    x * WAD / y
}

/// `e^x` in WAD, for `x` in WAD.
pub fn w_exp(x: I256) -> I256 {
    if x < -LN_WEI_INT_ABS {
        return I256::ZERO;
    }
    if x >= WEXP_UPPER_BOUND {
        return WEXP_UPPER_VALUE;
    }

    // Decompose x = q * ln(2) + r with q rounded to nearest.
    let half_ln_2 = LN_2_INT / int(2);
    let rounding_adjustment = if x.is_negative() { -half_ln_2 } else { half_ln_2 };
    let q = (x + rounding_adjustment) / LN_2_INT;
    let r = x - q * LN_2_INT;

    let exp_r = WAD + r + r * r / WAD / int(2);
    let shift: usize = q.unsigned_abs().saturating_to();

    if q.is_negative() {
        I256::from_raw(exp_r.into_raw() >> shift)
    } else {
        I256::from_raw(exp_r.into_raw() << shift)
    }
}

fn curve(rate_at_target: I256, err: I256) -> I256 {
    let coeff = if err.is_negative() {
        WAD - w_div_to_zero(WAD, CURVE_STEEPNESS)
    } else {
        CURVE_STEEPNESS - WAD
    };
    w_mul_to_zero(w_mul_to_zero(coeff, err) + WAD, rate_at_target)
}

fn new_rate_at_target(start_rate_at_target: I256, linear_adaptation: I256) -> I256 {
    w_mul_to_zero(start_rate_at_target, w_exp(linear_adaptation))
        .max(MIN_RATE_AT_TARGET)
        .min(MAX_RATE_AT_TARGET)
}

/// Result of a borrow rate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowRate {
    /// Average per-second borrow rate over the elapsed period.
    pub avg_rate: U256,
    /// Rate at target stored by the IRM after the period.
    pub end_rate_at_target: I256,
}

/// Per-second borrow rate for a market after `elapsed` seconds.
///
/// A zero `rate_at_target` means the IRM has never been called for the
/// market, which starts it at [`INITIAL_RATE_AT_TARGET`].
pub fn borrow_rate(
    total_supply_assets: U256,
    total_borrow_assets: U256,
    rate_at_target: I256,
    elapsed: u64,
) -> BorrowRate {
    let utilization = if total_supply_assets.is_zero() {
        I256::ZERO
    } else {
        I256::from_raw(w_div_down(total_borrow_assets, total_supply_assets))
    };

    let err_norm_factor = if utilization > TARGET_UTILIZATION {
        WAD - TARGET_UTILIZATION
    } else {
        TARGET_UTILIZATION
    };
    let err = w_div_to_zero(utilization - TARGET_UTILIZATION, err_norm_factor);

    let (avg_rate_at_target, end_rate_at_target) = if rate_at_target.is_zero() {
        (INITIAL_RATE_AT_TARGET, INITIAL_RATE_AT_TARGET)
    } else {
        let speed = w_mul_to_zero(ADJUSTMENT_SPEED, err);
        let linear_adaptation = speed * int(elapsed);

        if linear_adaptation.is_zero() {
            (rate_at_target, rate_at_target)
        } else {
            let end = new_rate_at_target(rate_at_target, linear_adaptation);
            let mid = new_rate_at_target(rate_at_target, linear_adaptation / int(2));
            ((rate_at_target + end + int(2) * mid) / int(4), end)
        }
    };

    let rate = curve(avg_rate_at_target, err);
    BorrowRate {
        avg_rate: if rate.is_negative() { U256::ZERO } else { rate.into_raw() },
        end_rate_at_target,
    }
}
