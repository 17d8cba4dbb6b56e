//! Provider management for HTTP connections.
//! Uses Alloy providers for type-safe RPC interactions.

use alloy::contract::Error as ContractError;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{aliases::U24, Address, B256, I256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::contracts::{
    IAdaptiveCurveIrm, IERC20, IERC4626, IMorpho, IOracle, IUniswapV3Factory, IUniswapV3Pool,
};
use crate::reader::{ChainReader, MarketStateRaw, PositionRaw};

/// Read-side RPC access for one chain.
#[derive(Debug, Clone)]
pub struct ProviderManager {
    /// HTTP URL used for reads and simulation
    http_url: String,
    /// Chain ID reported by the node
    chain_id: u64,
}

impl ProviderManager {
    /// Connect and verify the endpoint serves the expected chain.
    pub async fn new(http_url: &str, expected_chain_id: u64) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(http_url.parse()?);
        let chain_id = provider
            .get_chain_id()
            .await
            .with_context(|| format!("RPC {http_url} unreachable"))?;

        if chain_id != expected_chain_id {
            anyhow::bail!(
                "RPC serves chain {} but chain {} was configured",
                chain_id,
                expected_chain_id
            );
        }

        let block = provider.get_block_number().await?;
        info!(chain_id, block, "Provider connection verified");

        Ok(Self {
            http_url: http_url.to_string(),
            chain_id,
        })
    }

    /// Get the HTTP URL.
    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Get current block number.
    pub async fn block_number(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        Ok(provider.get_block_number().await?)
    }
}

#[async_trait]
impl ChainReader for ProviderManager {
    async fn block_timestamp(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let block = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Latest block unavailable"))?;
        Ok(block.header.timestamp)
    }

    async fn oracle_price(&self, oracle: Address) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let price = IOracle::new(oracle, &provider).price().call().await?;
        debug!(oracle = %oracle, price = %price._0, "Oracle price");
        Ok(price._0)
    }

    async fn morpho_market(&self, morpho: Address, id: B256) -> Result<MarketStateRaw> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let market = IMorpho::new(morpho, &provider).market(id).call().await?;
        Ok(MarketStateRaw {
            total_supply_assets: market.totalSupplyAssets,
            total_supply_shares: market.totalSupplyShares,
            total_borrow_assets: market.totalBorrowAssets,
            total_borrow_shares: market.totalBorrowShares,
            last_update: market.lastUpdate,
            fee: market.fee,
        })
    }

    async fn morpho_position(&self, morpho: Address, id: B256, user: Address) -> Result<PositionRaw> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let position = IMorpho::new(morpho, &provider).position(id, user).call().await?;
        Ok(PositionRaw {
            supply_shares: position.supplyShares,
            borrow_shares: position.borrowShares,
            collateral: position.collateral,
        })
    }

    async fn morpho_is_authorized(
        &self,
        morpho: Address,
        authorizer: Address,
        authorized: Address,
    ) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let result = IMorpho::new(morpho, &provider)
            .isAuthorized(authorizer, authorized)
            .call()
            .await?;
        Ok(result._0)
    }

    async fn irm_rate_at_target(&self, irm: Address, id: B256) -> Result<I256> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let rate = IAdaptiveCurveIrm::new(irm, &provider).rateAtTarget(id).call().await?;
        Ok(rate._0)
    }

    async fn erc20_decimals(&self, token: Address) -> Result<u8> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let decimals = IERC20::new(token, &provider).decimals().call().await?;
        Ok(decimals._0)
    }

    async fn erc4626_asset(&self, vault: Address) -> Result<Option<Address>> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        match IERC4626::new(vault, &provider).asset().call().await {
            Ok(asset) => Ok(Some(asset._0)),
            Err(e) if is_contract_answer(&e) => {
                debug!(vault = %vault, error = %e, "asset() not implemented");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn erc4626_preview_redeem(&self, vault: Address, shares: U256) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let assets = IERC4626::new(vault, &provider).previewRedeem(shares).call().await?;
        Ok(assets._0)
    }

    async fn uniswap_v3_pool(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
        fee: u32,
    ) -> Result<Address> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let result = IUniswapV3Factory::new(factory, &provider)
            .getPool(token_a, token_b, U24::from(fee))
            .call()
            .await?;
        Ok(result.pool)
    }

    async fn uniswap_v3_liquidity(&self, pool: Address) -> Result<u128> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let liquidity = IUniswapV3Pool::new(pool, &provider).liquidity().call().await?;
        Ok(liquidity._0)
    }
}

/// Whether a failed call was answered by the contract itself (revert, empty
/// or undecodable return data) rather than lost in transport.
fn is_contract_answer(error: &ContractError) -> bool {
    match error {
        ContractError::ZeroData(..) | ContractError::AbiError(_) => true,
        ContractError::TransportError(rpc) => rpc
            .as_error_resp()
            .is_some_and(|payload| payload.message.to_lowercase().contains("revert")),
        _ => false,
    }
}
