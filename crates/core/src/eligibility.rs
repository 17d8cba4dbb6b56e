//! Liquidation sizing for Morpho Blue and pre-liquidation contracts.
//!
//! Amounts follow the on-chain checks exactly: the seizable collateral is the
//! largest amount `liquidate`/`preLiquidate` accepts for the position, and the
//! repayable assets are what the protocol pulls from the liquidator for it.

use alloy::primitives::U256;

use crate::market::{MarketState, PreLiquidation, PreLiquidationParams};
use crate::math::{
    mul_div_down, mul_div_up, to_assets_down, to_assets_up, to_shares_up, w_div_down, w_div_up,
    w_mul_down, LIQUIDATION_CURSOR, MAX_LIQUIDATION_INCENTIVE_FACTOR, ORACLE_PRICE_SCALE, WAD,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiquidationValues {
    pub seizable_collateral: U256,
    pub repayable_assets: U256,
}

impl LiquidationValues {
    pub const ZERO: Self = Self {
        seizable_collateral: U256::ZERO,
        repayable_assets: U256::ZERO,
    };

    /// Both amounts must be non-zero for a liquidation to be worth encoding.
    pub fn is_actionable(&self) -> bool {
        !self.seizable_collateral.is_zero() && !self.repayable_assets.is_zero()
    }
}

/// Borrow side of a position together with the market totals it is priced against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowPosition {
    pub collateral: U256,
    pub borrow_shares: U256,
    pub total_borrow_assets: U256,
    pub total_borrow_shares: U256,
}

impl BorrowPosition {
    pub fn new(collateral: U256, borrow_shares: U256, market: &MarketState) -> Self {
        Self {
            collateral,
            borrow_shares,
            total_borrow_assets: market.total_borrow_assets,
            total_borrow_shares: market.total_borrow_shares,
        }
    }

    /// Debt rounded up, as Morpho does in its health check.
    pub fn borrowed(&self) -> U256 {
        to_assets_up(self.borrow_shares, self.total_borrow_assets, self.total_borrow_shares)
    }

    /// Collateral value in loan token units, rounded down.
    pub fn collateral_quoted(&self, price: U256) -> U256 {
        mul_div_down(self.collateral, price, ORACLE_PRICE_SCALE)
    }

    fn assets_down(&self, shares: U256) -> U256 {
        to_assets_down(shares, self.total_borrow_assets, self.total_borrow_shares)
    }

    /// Assets pulled for seizing `seized` collateral at `incentive`.
    fn repayable_for(&self, seized: U256, price: U256, incentive: U256) -> U256 {
        let seized_quoted = mul_div_up(seized, price, ORACLE_PRICE_SCALE);
        let repaid_shares = to_shares_up(
            w_div_up(seized_quoted, incentive),
            self.total_borrow_assets,
            self.total_borrow_shares,
        );
        to_assets_up(repaid_shares, self.total_borrow_assets, self.total_borrow_shares)
    }
}

/// `min(1.15, 1 / (1 - 0.3 * (1 - lltv)))` in WAD.
pub fn liquidation_incentive_factor(lltv: U256) -> U256 {
    let discount = w_mul_down(LIQUIDATION_CURSOR, WAD.saturating_sub(lltv));
    MAX_LIQUIDATION_INCENTIVE_FACTOR.min(w_div_down(WAD, WAD - discount))
}

/// Hard liquidation amounts; zero when the position is healthy.
pub fn liquidation_values(position: &BorrowPosition, lltv: U256, price: U256) -> LiquidationValues {
    if price.is_zero() {
        return LiquidationValues::ZERO;
    }

    let borrowed = position.borrowed();
    let max_borrow = w_mul_down(position.collateral_quoted(price), lltv);
    if borrowed <= max_borrow {
        return LiquidationValues::ZERO;
    }

    let incentive = liquidation_incentive_factor(lltv);
    let seizable_collateral = position.collateral.min(mul_div_down(
        w_mul_down(position.assets_down(position.borrow_shares), incentive),
        ORACLE_PRICE_SCALE,
        price,
    ));

    LiquidationValues {
        seizable_collateral,
        repayable_assets: position.repayable_for(seizable_collateral, price, incentive),
    }
}

/// Pre-liquidation amounts; zero unless `pre_lltv < LTV <= lltv`.
///
/// The incentive and close factors are interpolated linearly between their
/// values at `pre_lltv` and at `lltv`.
pub fn pre_liquidation_values(
    position: &BorrowPosition,
    lltv: U256,
    params: &PreLiquidationParams,
    price: U256,
) -> LiquidationValues {
    if price.is_zero() || lltv <= params.pre_lltv {
        return LiquidationValues::ZERO;
    }

    let collateral_quoted = position.collateral_quoted(price);
    if collateral_quoted.is_zero() {
        return LiquidationValues::ZERO;
    }

    let borrowed = position.borrowed();
    let eligible = borrowed <= w_mul_down(collateral_quoted, lltv)
        && borrowed > w_mul_down(collateral_quoted, params.pre_lltv);
    if !eligible {
        return LiquidationValues::ZERO;
    }

    let ltv = w_div_up(borrowed, collateral_quoted);
    let quotient = w_div_down(ltv - params.pre_lltv, lltv - params.pre_lltv);
    let pre_lif = w_mul_down(quotient, params.pre_lif2.saturating_sub(params.pre_lif1)) + params.pre_lif1;
    let pre_lcf = w_mul_down(quotient, params.pre_lcf2.saturating_sub(params.pre_lcf1)) + params.pre_lcf1;

    let repayable_shares = w_mul_down(position.borrow_shares, pre_lcf);
    let seizable_collateral = position
        .collateral
        .min(w_mul_down(position.collateral, pre_lcf))
        .min(mul_div_down(
            w_mul_down(position.assets_down(repayable_shares), pre_lif),
            ORACLE_PRICE_SCALE,
            price,
        ));

    LiquidationValues {
        seizable_collateral,
        repayable_assets: position.repayable_for(seizable_collateral, price, pre_lif),
    }
}

/// A pre-liquidation contract and the price its oracle reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedPreLiquidation {
    pub pre_liquidation: PreLiquidation,
    pub price: U256,
}

/// Pick the authorized pre-liquidation seizing the most collateral.
///
/// Ties go to the later candidate.
pub fn best_pre_liquidation<'a>(
    position: &BorrowPosition,
    lltv: U256,
    candidates: impl IntoIterator<Item = &'a PricedPreLiquidation>,
) -> Option<(&'a PricedPreLiquidation, LiquidationValues)> {
    let mut best: Option<(&'a PricedPreLiquidation, LiquidationValues)> = None;
    for candidate in candidates {
        let values = pre_liquidation_values(
            position,
            lltv,
            &candidate.pre_liquidation.params,
            candidate.price,
        );
        if !values.is_actionable() {
            continue;
        }
        if best.map_or(true, |(_, current)| values.seizable_collateral >= current.seizable_collateral) {
            best = Some((candidate, values));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    const E16: u64 = 10_000_000_000_000_000;

    fn pct(n: u64) -> U256 {
        U256::from(n * E16)
    }

    /// 1M USDC borrowed at the usual 1e6 shares per asset.
    fn wbtc_usdc(collateral: u64, borrowed_usdc: u64) -> BorrowPosition {
        let total_borrow_assets = U256::from(1_000_000_000_000u64);
        BorrowPosition {
            collateral: U256::from(collateral),
            borrow_shares: U256::from(borrowed_usdc) * U256::from(1_000_000_000_000u64),
            total_borrow_assets,
            total_borrow_shares: total_borrow_assets * U256::from(1_000_000u64),
        }
    }

    /// Oracle price of one WBTC (8 decimals) in USDC (6 decimals).
    fn btc_price(usd: u64) -> U256 {
        U256::from(usd) * ORACLE_PRICE_SCALE / U256::from(100)
    }

    fn pre_liquidation(byte: u8, lcf: (u64, u64), lif: (u64, u64)) -> PricedPreLiquidation {
        PricedPreLiquidation {
            pre_liquidation: PreLiquidation {
                address: Address::repeat_byte(byte),
                params: PreLiquidationParams {
                    pre_lltv: pct(80),
                    pre_lcf1: pct(lcf.0),
                    pre_lcf2: pct(lcf.1),
                    pre_lif1: pct(lif.0),
                    pre_lif2: pct(lif.1),
                    pre_liquidation_oracle: Address::repeat_byte(3),
                },
            },
            price: btc_price(60_000),
        }
    }

    #[test]
    fn test_incentive_factor_values() {
        assert_eq!(liquidation_incentive_factor(pct(86)), U256::from(1_043_841_336_116_910_229u64));
        assert_eq!(liquidation_incentive_factor(WAD), WAD);
        assert_eq!(liquidation_incentive_factor(U256::ZERO), MAX_LIQUIDATION_INCENTIVE_FACTOR);
    }

    #[test]
    fn test_incentive_factor_is_capped() {
        for lltv in (0..=100).map(pct) {
            let factor = liquidation_incentive_factor(lltv);
            assert!(factor <= MAX_LIQUIDATION_INCENTIVE_FACTOR);
            assert!(factor >= WAD);
        }
    }

    #[test]
    fn test_healthy_position_is_not_liquidatable() {
        // 6000 USDC of collateral at 86% allows 5160 USDC of debt.
        let position = wbtc_usdc(10_000_000, 5_000);
        assert_eq!(liquidation_values(&position, pct(86), btc_price(60_000)), LiquidationValues::ZERO);
    }

    #[test]
    fn test_liquidation_of_0_1_btc_at_86_lltv() {
        let position = wbtc_usdc(10_000_000, 5_500);
        let price = btc_price(60_000);
        assert_eq!(position.borrowed(), U256::from(5_500_000_000u64));

        let values = liquidation_values(&position, pct(86), price);
        // 5500 * 1.0438 / 60000 BTC, in sats.
        assert_eq!(values.seizable_collateral, U256::from(9_568_545u64));
        assert_eq!(values.repayable_assets, U256::from(5_499_999_667u64));
        assert!(values.repayable_assets <= position.borrowed());
    }

    /// Morpho `liquidate(seizedAssets)` accounting: returns the position's
    /// remaining collateral and borrow shares.
    fn liquidate_seized(position: &BorrowPosition, seized: U256, price: U256, lltv: U256) -> (U256, U256) {
        let seized_quoted = mul_div_up(seized, price, ORACLE_PRICE_SCALE);
        let repaid_shares = to_shares_up(
            w_div_up(seized_quoted, liquidation_incentive_factor(lltv)),
            position.total_borrow_assets,
            position.total_borrow_shares,
        );
        (position.collateral - seized, position.borrow_shares - repaid_shares)
    }

    #[test]
    fn test_liquidating_seizable_leaves_only_dust() {
        let position = wbtc_usdc(10_000_000, 5_500);
        let price = btc_price(60_000);
        let values = liquidation_values(&position, pct(86), price);

        let (collateral, borrow_shares) = liquidate_seized(&position, values.seizable_collateral, price, pct(86));
        assert_eq!(collateral, U256::from(431_455u64));
        // Seizable collateral rounds down, so 333 USDC base units of debt remain.
        assert_eq!(borrow_shares, U256::from(333_000_000u64));
        let remaining = BorrowPosition {
            collateral,
            borrow_shares,
            ..position
        };
        assert_eq!(remaining.borrowed(), U256::from(333u64));
        // Less than one unit of collateral is worth.
        assert!(remaining.borrowed() < mul_div_down(U256::from(1u64), price, ORACLE_PRICE_SCALE));
    }

    #[test]
    fn test_underwater_position_seizes_all_collateral() {
        let position = wbtc_usdc(10_000_000, 5_500);
        let values = liquidation_values(&position, pct(86), btc_price(50_000));
        assert_eq!(values.seizable_collateral, U256::from(10_000_000u64));
        assert_eq!(values.repayable_assets, U256::from(4_790_000_001u64));
    }

    #[test]
    fn test_higher_price_never_makes_position_liquidatable() {
        let position = wbtc_usdc(10_000_000, 5_500);
        let mut was_liquidatable = true;
        for usd in (40_000..80_000).step_by(500) {
            let liquidatable = liquidation_values(&position, pct(86), btc_price(usd)).is_actionable();
            assert!(!liquidatable || was_liquidatable);
            was_liquidatable = liquidatable;
        }
        assert!(!was_liquidatable);
    }

    #[test]
    fn test_zero_price_is_ignored() {
        let position = wbtc_usdc(10_000_000, 5_500);
        assert_eq!(liquidation_values(&position, pct(86), U256::ZERO), LiquidationValues::ZERO);
    }

    #[test]
    fn test_pre_liquidation_values() {
        // LTV 83.3%: between pre-LLTV and LLTV.
        let position = wbtc_usdc(10_000_000, 5_000);
        let candidate = pre_liquidation(1, (30, 50), (102, 104));
        let values = pre_liquidation_values(&position, pct(86), &candidate.pre_liquidation.params, candidate.price);
        assert_eq!(values.seizable_collateral, U256::from(3_532_510u64));
        assert_eq!(values.repayable_assets, U256::from(2_055_555_388u64));
    }

    #[test]
    fn test_pre_liquidation_outside_band() {
        let params = pre_liquidation(1, (30, 50), (102, 104)).pre_liquidation.params;
        let price = btc_price(60_000);
        // Below pre-LLTV.
        assert_eq!(pre_liquidation_values(&wbtc_usdc(10_000_000, 4_000), pct(86), &params, price), LiquidationValues::ZERO);
        // Above LLTV belongs to hard liquidation.
        assert_eq!(pre_liquidation_values(&wbtc_usdc(10_000_000, 5_500), pct(86), &params, price), LiquidationValues::ZERO);
    }

    #[test]
    fn test_best_pre_liquidation_takes_largest_seizable() {
        let position = wbtc_usdc(10_000_000, 5_000);
        let small = pre_liquidation(1, (10, 20), (101, 102));
        let large = pre_liquidation(2, (30, 50), (102, 104));

        for candidates in [vec![small, large], vec![large, small]] {
            let (best, values) = best_pre_liquidation(&position, pct(86), &candidates).unwrap();
            assert_eq!(best.pre_liquidation.address, Address::repeat_byte(2));
            assert_eq!(values.seizable_collateral, U256::from(3_532_510u64));
        }

        let single = [small];
        let (only, values) = best_pre_liquidation(&position, pct(86), &single).unwrap();
        assert_eq!(only.pre_liquidation.address, Address::repeat_byte(1));
        assert_eq!(values.seizable_collateral, U256::from(1_316_460u64));
    }

    #[test]
    fn test_best_pre_liquidation_tie_takes_later() {
        let position = wbtc_usdc(10_000_000, 5_000);
        let candidates = [
            pre_liquidation(1, (30, 50), (102, 104)),
            pre_liquidation(2, (30, 50), (102, 104)),
        ];
        let (best, _) = best_pre_liquidation(&position, pct(86), &candidates).unwrap();
        assert_eq!(best.pre_liquidation.address, Address::repeat_byte(2));
    }

    #[test]
    fn test_best_pre_liquidation_none_when_ineligible() {
        let position = wbtc_usdc(10_000_000, 4_000);
        let candidates = [pre_liquidation(1, (30, 50), (102, 104))];
        assert!(best_pre_liquidation(&position, pct(86), &candidates).is_none());
    }
}
