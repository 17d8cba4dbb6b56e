//! Market evaluation over replicated rows.
//!
//! [`evaluate_market`] is the computation behind the indexer's
//! `liquidatable-positions` endpoint; [`top_positions`] backs the health view.

use alloy::primitives::{Address, U256};
use liquidator_api::{
    LiquidatablePosition, LiquidatablePositions, PreLiquidatablePosition, PreLiquidationData,
};
use std::collections::HashSet;
use tracing::debug;

use crate::eligibility::{
    best_pre_liquidation, liquidation_values, BorrowPosition, LiquidationValues,
    PricedPreLiquidation,
};
use crate::market::{market_params_to_data, Market, Position};
use crate::math::{w_div_down, w_mul_down};

/// `(authorizer, authorized)` pairs with `isAuthorized == true`.
pub type Authorizations = HashSet<(Address, Address)>;

/// Everything needed to evaluate one market at a point in time.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub chain_id: u64,
    pub market: Market,
    /// Market oracle price.
    pub price: U256,
    pub positions: Vec<Position>,
    /// Pre-liquidation contracts of the market with their oracle prices.
    pub pre_liquidations: Vec<PricedPreLiquidation>,
}

impl MarketSnapshot {
    /// Price for a pre-liquidation oracle, reusing the market price when the
    /// oracles coincide.
    pub fn price_for_oracle(&self, oracle: Address, read: impl FnOnce(Address) -> Option<U256>) -> Option<U256> {
        if oracle == self.market.params.oracle {
            Some(self.price)
        } else {
            read(oracle)
        }
    }
}

/// Liquidatable and pre-liquidatable positions of a market at `now`.
///
/// Pre-liquidations are only considered for positions that cannot be hard
/// liquidated, and only those authorized by the borrower.
pub fn evaluate_market(
    snapshot: &MarketSnapshot,
    now: u64,
    authorizations: &Authorizations,
) -> LiquidatablePositions {
    let mut result = LiquidatablePositions::default();
    if snapshot.market.params.oracle == Address::ZERO {
        return result;
    }

    let accrued = snapshot.market.accrue(now);
    let lltv = accrued.params.lltv;
    let market_params = market_params_to_data(&accrued.params);

    for position in &snapshot.positions {
        let borrow = BorrowPosition::new(position.collateral, position.borrow_shares, &accrued.state);

        let values = liquidation_values(&borrow, lltv, snapshot.price);
        if values.is_actionable() {
            result.liquidatable_positions.push(LiquidatablePosition {
                position: position.to_data(snapshot.chain_id, accrued.id),
                market_params: market_params.clone(),
                seizable_collateral: values.seizable_collateral,
                repayable_assets: values.repayable_assets,
            });
            continue;
        }

        let enabled = snapshot
            .pre_liquidations
            .iter()
            .filter(|p| authorizations.contains(&(position.user, p.pre_liquidation.address)));

        if let Some((best, values)) = best_pre_liquidation(&borrow, lltv, enabled) {
            result.pre_liquidatable_positions.push(PreLiquidatablePosition {
                position: position.to_data(snapshot.chain_id, accrued.id),
                market_params: market_params.clone(),
                seizable_collateral: values.seizable_collateral,
                repayable_assets: values.repayable_assets,
                pre_liquidation: PreLiquidationData {
                    address: best.pre_liquidation.address,
                    params: (&best.pre_liquidation.params).into(),
                    price: best.price,
                },
            });
        }
    }

    debug!(
        market = %accrued.id,
        positions = snapshot.positions.len(),
        liquidatable = result.liquidatable_positions.len(),
        pre_liquidatable = result.pre_liquidatable_positions.len(),
        "Evaluated market"
    );

    result
}

/// Health of a single position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionHealth {
    pub position: Position,
    /// Debt in loan token, rounded up.
    pub borrowed: U256,
    /// Collateral value in loan token.
    pub collateral_value: U256,
    /// `collateral_value * lltv / borrowed` in WAD; `None` without debt.
    pub health_factor: Option<U256>,
    pub liquidation: Option<LiquidationValues>,
}

impl PositionHealth {
    pub fn is_liquidatable(&self) -> bool {
        self.liquidation.is_some()
    }
}

/// Up to `limit` positions with the most collateral, healthiest last on ties.
pub fn top_positions(snapshot: &MarketSnapshot, now: u64, limit: usize) -> Vec<PositionHealth> {
    let accrued = snapshot.market.accrue(now);
    let lltv = accrued.params.lltv;

    let mut health: Vec<PositionHealth> = snapshot
        .positions
        .iter()
        .map(|position| {
            let borrow = BorrowPosition::new(position.collateral, position.borrow_shares, &accrued.state);
            let borrowed = borrow.borrowed();
            let collateral_value = borrow.collateral_quoted(snapshot.price);
            let health_factor = (!borrowed.is_zero())
                .then(|| w_div_down(w_mul_down(collateral_value, lltv), borrowed));
            let values = liquidation_values(&borrow, lltv, snapshot.price);

            PositionHealth {
                position: *position,
                borrowed,
                collateral_value,
                health_factor,
                liquidation: values.is_actionable().then_some(values),
            }
        })
        .collect();

    health.sort_by(|a, b| {
        b.position
            .collateral
            .cmp(&a.position.collateral)
            .then_with(|| a.health_factor.unwrap_or(U256::MAX).cmp(&b.health_factor.unwrap_or(U256::MAX)))
    });
    health.truncate(limit);
    health
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irm::INITIAL_RATE_AT_TARGET;
    use crate::market::{MarketState, PreLiquidation, PreLiquidationParams};
    use crate::math::{ORACLE_PRICE_SCALE, WAD};
    use liquidator_chain::MarketParams;

    const E16: u64 = 10_000_000_000_000_000;
    const NOW: u64 = 1_700_000_000;

    fn pct(n: u64) -> U256 {
        U256::from(n * E16)
    }

    fn user(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn position(byte: u8, collateral: u64, borrowed_usdc: u64) -> Position {
        Position {
            user: user(byte),
            supply_shares: U256::ZERO,
            borrow_shares: U256::from(borrowed_usdc) * U256::from(1_000_000_000_000u64),
            collateral: U256::from(collateral),
        }
    }

    fn snapshot(positions: Vec<Position>) -> MarketSnapshot {
        let params = MarketParams {
            loanToken: Address::repeat_byte(0xaa),
            collateralToken: Address::repeat_byte(0xbb),
            oracle: Address::repeat_byte(0xcc),
            irm: Address::repeat_byte(0xdd),
            lltv: pct(86),
        };
        let total_borrow_assets = U256::from(1_000_000_000_000u64);
        let state = MarketState {
            total_supply_assets: total_borrow_assets * U256::from(2),
            total_supply_shares: total_borrow_assets * U256::from(2_000_000u64),
            total_borrow_assets,
            total_borrow_shares: total_borrow_assets * U256::from(1_000_000u64),
            last_update: NOW,
            fee: U256::ZERO,
        };
        MarketSnapshot {
            chain_id: 1,
            market: Market::new(params, state, INITIAL_RATE_AT_TARGET),
            price: U256::from(60_000u64) * ORACLE_PRICE_SCALE / U256::from(100),
            positions,
            pre_liquidations: vec![
                priced(0xe1, (10, 20), (101, 102)),
                priced(0xe2, (30, 50), (102, 104)),
            ],
        }
    }

    fn priced(byte: u8, lcf: (u64, u64), lif: (u64, u64)) -> PricedPreLiquidation {
        PricedPreLiquidation {
            pre_liquidation: PreLiquidation {
                address: Address::repeat_byte(byte),
                params: PreLiquidationParams {
                    pre_lltv: pct(80),
                    pre_lcf1: pct(lcf.0),
                    pre_lcf2: pct(lcf.1),
                    pre_lif1: pct(lif.0),
                    pre_lif2: pct(lif.1),
                    pre_liquidation_oracle: Address::repeat_byte(0xcc),
                },
            },
            price: U256::from(60_000u64) * ORACLE_PRICE_SCALE / U256::from(100),
        }
    }

    #[test]
    fn test_evaluate_market_splits_hard_and_pre() {
        let snapshot = snapshot(vec![
            position(1, 10_000_000, 5_500), // above LLTV
            position(2, 10_000_000, 5_000), // in the pre-liquidation band
            position(3, 10_000_000, 1_000), // healthy
            position(4, 10_000_000, 5_000), // in band, not authorized
        ]);
        let authorizations: Authorizations = [(user(2), Address::repeat_byte(0xe1)), (user(2), Address::repeat_byte(0xe2)), (user(1), Address::repeat_byte(0xe2))]
            .into_iter()
            .collect();

        let result = evaluate_market(&snapshot, NOW, &authorizations);

        assert_eq!(result.liquidatable_positions.len(), 1);
        let hard = &result.liquidatable_positions[0];
        assert_eq!(hard.position.user, user(1));
        assert_eq!(hard.position.market_id, snapshot.market.id);
        assert_eq!(hard.seizable_collateral, U256::from(9_568_545u64));

        assert_eq!(result.pre_liquidatable_positions.len(), 1);
        let pre = &result.pre_liquidatable_positions[0];
        assert_eq!(pre.position.user, user(2));
        assert_eq!(pre.pre_liquidation.address, Address::repeat_byte(0xe2));
        assert_eq!(pre.seizable_collateral, U256::from(3_532_510u64));
    }

    #[test]
    fn test_evaluate_market_skips_markets_without_oracle() {
        let mut snapshot = snapshot(vec![position(1, 10_000_000, 5_500)]);
        snapshot.market.params.oracle = Address::ZERO;
        assert!(evaluate_market(&snapshot, NOW, &Authorizations::new()).is_empty());
    }

    #[test]
    fn test_evaluate_market_accrues_to_now() {
        // 5150 USDC sits just under the 5160 limit and crosses it after a year of interest.
        let snapshot = snapshot(vec![position(1, 10_000_000, 5_150)]);
        assert!(evaluate_market(&snapshot, NOW, &Authorizations::new()).is_empty());
        let later = evaluate_market(&snapshot, NOW + 31_536_000, &Authorizations::new());
        assert_eq!(later.liquidatable_positions.len(), 1);
    }

    #[test]
    fn test_top_positions() {
        let snapshot = snapshot(vec![
            position(1, 5_000_000, 1_000),
            position(2, 10_000_000, 5_500),
            position(3, 20_000_000, 0),
        ]);
        let top = top_positions(&snapshot, NOW, 2);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].position.user, user(3));
        assert_eq!(top[0].health_factor, None);
        assert!(!top[0].is_liquidatable());

        assert_eq!(top[1].position.user, user(2));
        assert!(top[1].health_factor.unwrap() < WAD);
        assert!(top[1].is_liquidatable());
        assert_eq!(top[1].collateral_value, U256::from(6_000_000_000u64));
    }

    #[test]
    fn test_price_for_oracle_reuses_market_price() {
        let snapshot = snapshot(vec![]);
        let oracle = snapshot.market.params.oracle;
        assert_eq!(snapshot.price_for_oracle(oracle, |_| None), Some(snapshot.price));
        assert_eq!(snapshot.price_for_oracle(Address::ZERO, |_| Some(U256::from(7))), Some(U256::from(7)));
    }
}
