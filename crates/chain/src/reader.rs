//! Read-only chain access used by venues and by local re-validation.
//!
//! Everything that needs chain state goes through [`ChainReader`] so the
//! conversion pipeline and execution guard can be exercised without a node.

use alloy::primitives::{Address, B256, I256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Raw `Morpho.market(id)` tuple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketStateRaw {
    pub total_supply_assets: u128,
    pub total_supply_shares: u128,
    pub total_borrow_assets: u128,
    pub total_borrow_shares: u128,
    pub last_update: u128,
    pub fee: u128,
}

/// Raw `Morpho.position(id, user)` tuple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionRaw {
    pub supply_shares: U256,
    pub borrow_shares: u128,
    pub collateral: u128,
}

#[async_trait]
pub trait ChainReader: Send + Sync + Debug {
    /// Timestamp of the latest block.
    async fn block_timestamp(&self) -> Result<u64>;

    /// Oracle price scaled by 1e36.
    async fn oracle_price(&self, oracle: Address) -> Result<U256>;

    async fn morpho_market(&self, morpho: Address, id: B256) -> Result<MarketStateRaw>;

    async fn morpho_position(&self, morpho: Address, id: B256, user: Address) -> Result<PositionRaw>;

    async fn morpho_is_authorized(
        &self,
        morpho: Address,
        authorizer: Address,
        authorized: Address,
    ) -> Result<bool>;

    async fn irm_rate_at_target(&self, irm: Address, id: B256) -> Result<I256>;

    async fn erc20_decimals(&self, token: Address) -> Result<u8>;

    /// `asset()` of a presumed ERC-4626 vault. `None` when the call reverts or
    /// returns nothing decodable, i.e. `vault` is not one; errors are
    /// transport failures that may succeed on retry.
    async fn erc4626_asset(&self, vault: Address) -> Result<Option<Address>>;

    async fn erc4626_preview_redeem(&self, vault: Address, shares: U256) -> Result<U256>;

    /// `getPool` on a Uniswap V3 factory; zero address when the pool does not exist.
    async fn uniswap_v3_pool(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
        fee: u32,
    ) -> Result<Address>;

    async fn uniswap_v3_liquidity(&self, pool: Address) -> Result<u128>;
}
