//! Liquidation candidates as served by the indexer.

use alloy::primitives::{Address, B256, U256};
use liquidator_api::{LiquidatablePosition, LiquidatablePositions, PreLiquidatablePosition};
use liquidator_chain::MarketParams;

use crate::eligibility::LiquidationValues;
use crate::market::{market_params_from_data, PreLiquidationParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationKind {
    /// `Morpho.liquidate`
    Hard,
    /// `PreLiquidation.preLiquidate` on the given contract.
    Pre {
        address: Address,
        params: PreLiquidationParams,
        price: U256,
    },
}

/// A position the bot will try to liquidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationCandidate {
    pub chain_id: u64,
    pub market_id: B256,
    pub market_params: MarketParams,
    pub user: Address,
    pub values: LiquidationValues,
    pub kind: LiquidationKind,
}

impl LiquidationCandidate {
    pub fn is_pre_liquidation(&self) -> bool {
        matches!(self.kind, LiquidationKind::Pre { .. })
    }

    /// Contract that pulls the repaid loan tokens.
    pub fn spender(&self, morpho: Address) -> Address {
        match self.kind {
            LiquidationKind::Hard => morpho,
            LiquidationKind::Pre { address, .. } => address,
        }
    }

    pub fn cooldown_key(&self) -> (B256, Address) {
        (self.market_id, self.user)
    }
}

impl From<&LiquidatablePosition> for LiquidationCandidate {
    fn from(p: &LiquidatablePosition) -> Self {
        Self {
            chain_id: p.position.chain_id,
            market_id: p.position.market_id,
            market_params: market_params_from_data(&p.market_params),
            user: p.position.user,
            values: LiquidationValues {
                seizable_collateral: p.seizable_collateral,
                repayable_assets: p.repayable_assets,
            },
            kind: LiquidationKind::Hard,
        }
    }
}

impl From<&PreLiquidatablePosition> for LiquidationCandidate {
    fn from(p: &PreLiquidatablePosition) -> Self {
        Self {
            chain_id: p.position.chain_id,
            market_id: p.position.market_id,
            market_params: market_params_from_data(&p.market_params),
            user: p.position.user,
            values: LiquidationValues {
                seizable_collateral: p.seizable_collateral,
                repayable_assets: p.repayable_assets,
            },
            kind: LiquidationKind::Pre {
                address: p.pre_liquidation.address,
                params: (&p.pre_liquidation.params).into(),
                price: p.pre_liquidation.price,
            },
        }
    }
}

/// Flatten an indexer response, hard liquidations first.
pub fn candidates(positions: &LiquidatablePositions) -> Vec<LiquidationCandidate> {
    positions
        .liquidatable_positions
        .iter()
        .map(LiquidationCandidate::from)
        .chain(
            positions
                .pre_liquidatable_positions
                .iter()
                .map(LiquidationCandidate::from),
        )
        .collect()
}
