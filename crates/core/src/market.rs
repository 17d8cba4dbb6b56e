//! Replicated Morpho Blue market and position state.

use alloy::primitives::{Address, B256, I256, U256};
use liquidator_api::{MarketParamsData, PositionData, PreLiquidationParamsData};
use liquidator_chain::{MarketParams, MarketStateRaw, PositionRaw};

use crate::irm;
use crate::math::{to_shares_down, w_mul_down, w_taylor_compounded};

/// Market totals as stored by Morpho Blue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketState {
    pub total_supply_assets: U256,
    pub total_supply_shares: U256,
    pub total_borrow_assets: U256,
    pub total_borrow_shares: U256,
    /// Unix seconds of the last accrual.
    pub last_update: u64,
    pub fee: U256,
}

impl From<MarketStateRaw> for MarketState {
    fn from(raw: MarketStateRaw) -> Self {
        Self {
            total_supply_assets: U256::from(raw.total_supply_assets),
            total_supply_shares: U256::from(raw.total_supply_shares),
            total_borrow_assets: U256::from(raw.total_borrow_assets),
            total_borrow_shares: U256::from(raw.total_borrow_shares),
            last_update: u64::try_from(raw.last_update).unwrap_or(u64::MAX),
            fee: U256::from(raw.fee),
        }
    }
}

/// A market snapshot with the IRM state needed to project it forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub id: B256,
    pub params: MarketParams,
    pub state: MarketState,
    /// AdaptiveCurveIrm `rateAtTarget` for this market.
    pub rate_at_target: I256,
}

impl Market {
    pub fn new(params: MarketParams, state: MarketState, rate_at_target: I256) -> Self {
        Self {
            id: params.id(),
            params,
            state,
            rate_at_target,
        }
    }

    /// Project the market to `timestamp` as `Morpho._accrueInterest` would.
    ///
    /// Returns a new market; `self` is untouched. Timestamps at or before
    /// `last_update` return an identical copy.
    pub fn accrue(&self, timestamp: u64) -> Self {
        let elapsed = timestamp.saturating_sub(self.state.last_update);
        if elapsed == 0 {
            return self.clone();
        }

        let mut state = self.state;
        let mut rate_at_target = self.rate_at_target;

        if self.params.irm != Address::ZERO {
            let rate = irm::borrow_rate(
                state.total_supply_assets,
                state.total_borrow_assets,
                self.rate_at_target,
                elapsed,
            );
            let interest = w_mul_down(
                state.total_borrow_assets,
                w_taylor_compounded(rate.avg_rate, U256::from(elapsed)),
            );
            state.total_borrow_assets += interest;
            state.total_supply_assets += interest;

            if !state.fee.is_zero() {
                let fee_amount = w_mul_down(interest, state.fee);
                // Shares minted against pre-fee totals.
                let fee_shares = to_shares_down(
                    fee_amount,
                    state.total_supply_assets - fee_amount,
                    state.total_supply_shares,
                );
                state.total_supply_shares += fee_shares;
            }

            rate_at_target = rate.end_rate_at_target;
        }

        state.last_update = timestamp;

        Self {
            id: self.id,
            params: self.params.clone(),
            state,
            rate_at_target,
        }
    }
}

/// `keccak256(abi.encode(params))`
pub fn market_id(params: &MarketParams) -> B256 {
    params.id()
}

pub fn market_params_from_data(data: &MarketParamsData) -> MarketParams {
    MarketParams {
        loanToken: data.loan_token,
        collateralToken: data.collateral_token,
        oracle: data.oracle,
        irm: data.irm,
        lltv: data.lltv,
    }
}

pub fn market_params_to_data(params: &MarketParams) -> MarketParamsData {
    MarketParamsData {
        loan_token: params.loanToken,
        collateral_token: params.collateralToken,
        irm: params.irm,
        oracle: params.oracle,
        lltv: params.lltv,
    }
}

/// A borrower's position in one market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub user: Address,
    pub supply_shares: U256,
    pub borrow_shares: U256,
    pub collateral: U256,
}

impl Position {
    pub fn from_raw(user: Address, raw: PositionRaw) -> Self {
        Self {
            user,
            supply_shares: raw.supply_shares,
            borrow_shares: U256::from(raw.borrow_shares),
            collateral: U256::from(raw.collateral),
        }
    }

    pub fn to_data(&self, chain_id: u64, market_id: B256) -> PositionData {
        PositionData {
            chain_id,
            market_id,
            user: self.user,
            collateral: self.collateral,
            borrow_shares: self.borrow_shares,
            supply_shares: self.supply_shares,
        }
    }
}

impl From<&PositionData> for Position {
    fn from(data: &PositionData) -> Self {
        Self {
            user: data.user,
            supply_shares: data.supply_shares,
            borrow_shares: data.borrow_shares,
            collateral: data.collateral,
        }
    }
}

/// Immutable parameters of a pre-liquidation contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreLiquidationParams {
    pub pre_lltv: U256,
    pub pre_lcf1: U256,
    pub pre_lcf2: U256,
    pub pre_lif1: U256,
    pub pre_lif2: U256,
    pub pre_liquidation_oracle: Address,
}

impl From<&PreLiquidationParamsData> for PreLiquidationParams {
    fn from(data: &PreLiquidationParamsData) -> Self {
        Self {
            pre_lltv: data.pre_lltv,
            pre_lcf1: data.pre_lcf1,
            pre_lcf2: data.pre_lcf2,
            pre_lif1: data.pre_lif1,
            pre_lif2: data.pre_lif2,
            pre_liquidation_oracle: data.pre_liquidation_oracle,
        }
    }
}

impl From<&PreLiquidationParams> for PreLiquidationParamsData {
    fn from(params: &PreLiquidationParams) -> Self {
        Self {
            pre_lltv: params.pre_lltv,
            pre_lcf1: params.pre_lcf1,
            pre_lcf2: params.pre_lcf2,
            pre_lif1: params.pre_lif1,
            pre_lif2: params.pre_lif2,
            pre_liquidation_oracle: params.pre_liquidation_oracle,
        }
    }
}

/// A deployed pre-liquidation contract for a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreLiquidation {
    pub address: Address,
    pub params: PreLiquidationParams,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irm::INITIAL_RATE_AT_TARGET;

    const YEAR: u64 = 31_536_000;

    fn usdc(amount: u64) -> U256 {
        U256::from(amount) * U256::from(1_000_000u64)
    }

    fn market(irm: Address, fee: U256) -> Market {
        let params = MarketParams {
            loanToken: Address::repeat_byte(1),
            collateralToken: Address::repeat_byte(2),
            oracle: Address::repeat_byte(3),
            irm,
            lltv: U256::from(860_000_000_000_000_000u64),
        };
        let state = MarketState {
            total_supply_assets: usdc(1_000),
            total_supply_shares: usdc(1_000) * U256::from(1_000_000u64),
            total_borrow_assets: usdc(900),
            total_borrow_shares: usdc(900) * U256::from(1_000_000u64),
            last_update: 1_700_000_000,
            fee,
        };
        Market::new(params, state, INITIAL_RATE_AT_TARGET)
    }

    #[test]
    fn test_accrue_at_target_utilization() {
        let m = market(Address::repeat_byte(4), U256::ZERO);
        let accrued = m.accrue(m.state.last_update + YEAR);

        // Utilization sits at target, so the rate stays at 4% APR compounded.
        let interest = U256::from(36_729_599u64);
        assert_eq!(accrued.state.total_borrow_assets, usdc(900) + interest);
        assert_eq!(accrued.state.total_supply_assets, usdc(1_000) + interest);
        assert_eq!(accrued.state.total_supply_shares, m.state.total_supply_shares);
        assert_eq!(accrued.state.last_update, m.state.last_update + YEAR);
        assert_eq!(accrued.rate_at_target, INITIAL_RATE_AT_TARGET);
        // Input is not mutated.
        assert_eq!(m.state.total_borrow_assets, usdc(900));
    }

    #[test]
    fn test_accrue_is_idempotent_at_same_timestamp() {
        let m = market(Address::repeat_byte(4), U256::from(100_000_000_000_000_000u64));
        let t = m.state.last_update + 12_345;
        let once = m.accrue(t);
        assert_eq!(once.accrue(t), once);
        assert_eq!(m.accrue(m.state.last_update), m);
        // Stale timestamps never rewind state.
        assert_eq!(once.accrue(t - 100), once);
    }

    #[test]
    fn test_accrue_conserves_supply_over_borrow() {
        for fee in [0u64, 50_000_000_000_000_000, 250_000_000_000_000_000] {
            let m = market(Address::repeat_byte(4), U256::from(fee));
            let accrued = m.accrue(m.state.last_update + 3 * YEAR);
            assert!(accrued.state.total_supply_assets >= accrued.state.total_borrow_assets);
            assert!(accrued.state.total_borrow_assets > m.state.total_borrow_assets);
        }
    }

    #[test]
    fn test_fee_mints_supply_shares() {
        let m = market(Address::repeat_byte(4), U256::from(100_000_000_000_000_000u64));
        let accrued = m.accrue(m.state.last_update + YEAR);
        assert!(accrued.state.total_supply_shares > m.state.total_supply_shares);
        assert_eq!(accrued.state.total_borrow_shares, m.state.total_borrow_shares);
    }

    #[test]
    fn test_no_irm_only_moves_timestamp() {
        let m = market(Address::ZERO, U256::ZERO);
        let accrued = m.accrue(m.state.last_update + YEAR);
        assert_eq!(accrued.state.total_borrow_assets, m.state.total_borrow_assets);
        assert_eq!(accrued.state.last_update, m.state.last_update + YEAR);
    }

    #[test]
    fn test_market_params_data_conversion() {
        let m = market(Address::repeat_byte(4), U256::ZERO);
        let data = market_params_to_data(&m.params);
        assert_eq!(market_params_from_data(&data), m.params);
        assert_eq!(market_params_from_data(&data).id(), m.id);
    }

    #[test]
    fn test_state_from_raw() {
        let raw = MarketStateRaw {
            total_supply_assets: 10,
            total_supply_shares: 20,
            total_borrow_assets: 5,
            total_borrow_shares: 6,
            last_update: 1_700_000_000,
            fee: 0,
        };
        let state = MarketState::from(raw);
        assert_eq!(state.total_borrow_shares, U256::from(6));
        assert_eq!(state.last_update, 1_700_000_000);
    }
}
