//! Client for the Morpho Blue indexer.
//!
//! The indexer replicates markets, positions, vault withdraw queues and
//! pre-liquidation contracts from chain events, and serves:
//!
//! - `GET  /chain/{id}/vault/{address}` → the vault's withdraw queue (market ids)
//! - `POST /chain/{id}/liquidatable-positions` `{ marketIds }` → eligible positions
//!
//! Integers travel as decimal strings.

use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Indexed position row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    pub chain_id: u64,
    pub market_id: B256,
    pub user: Address,
    #[serde(with = "decimal_u256")]
    pub collateral: U256,
    #[serde(with = "decimal_u256")]
    pub borrow_shares: U256,
    #[serde(with = "decimal_u256")]
    pub supply_shares: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParamsData {
    pub loan_token: Address,
    pub collateral_token: Address,
    pub irm: Address,
    pub oracle: Address,
    #[serde(with = "decimal_u256")]
    pub lltv: U256,
}

/// Tiered parameters of a pre-liquidation contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreLiquidationParamsData {
    #[serde(rename = "preLltv", with = "decimal_u256")]
    pub pre_lltv: U256,
    #[serde(rename = "preLCF1", with = "decimal_u256")]
    pub pre_lcf1: U256,
    #[serde(rename = "preLCF2", with = "decimal_u256")]
    pub pre_lcf2: U256,
    #[serde(rename = "preLIF1", with = "decimal_u256")]
    pub pre_lif1: U256,
    #[serde(rename = "preLIF2", with = "decimal_u256")]
    pub pre_lif2: U256,
    #[serde(rename = "preLiquidationOracle")]
    pub pre_liquidation_oracle: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreLiquidationData {
    pub address: Address,
    pub params: PreLiquidationParamsData,
    /// Price read from `params.pre_liquidation_oracle`.
    #[serde(with = "decimal_u256")]
    pub price: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidatablePosition {
    pub position: PositionData,
    pub market_params: MarketParamsData,
    #[serde(with = "decimal_u256")]
    pub seizable_collateral: U256,
    #[serde(with = "decimal_u256")]
    pub repayable_assets: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreLiquidatablePosition {
    pub position: PositionData,
    pub market_params: MarketParamsData,
    #[serde(with = "decimal_u256")]
    pub seizable_collateral: U256,
    #[serde(with = "decimal_u256")]
    pub repayable_assets: U256,
    pub pre_liquidation: PreLiquidationData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidatablePositions {
    #[serde(default)]
    pub liquidatable_positions: Vec<LiquidatablePosition>,
    #[serde(default)]
    pub pre_liquidatable_positions: Vec<PreLiquidatablePosition>,
}

impl LiquidatablePositions {
    pub fn len(&self) -> usize {
        self.liquidatable_positions.len() + self.pre_liquidatable_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extend(&mut self, other: LiquidatablePositions) {
        self.liquidatable_positions.extend(other.liquidatable_positions);
        self.pre_liquidatable_positions
            .extend(other.pre_liquidatable_positions);
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LiquidatablePositionsRequest<'a> {
    market_ids: &'a [B256],
}

#[derive(Debug, Clone)]
pub struct IndexerClient {
    client: reqwest::Client,
    base_url: String,
}

impl IndexerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Market ids a vault may withdraw from. Unknown vaults yield an empty list.
    #[instrument(skip(self))]
    pub async fn fetch_withdraw_queue(&self, chain_id: u64, vault: Address) -> Result<Vec<B256>> {
        let url = format!("{}/chain/{}/vault/{}", self.base_url, chain_id, vault);

        let queue: Option<Vec<B256>> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Failed to fetch {vault} withdraw queue"))?
            .json()
            .await?;

        let queue = queue.unwrap_or_default();
        debug!(markets = queue.len(), "Fetched withdraw queue");
        Ok(queue)
    }

    /// Positions the indexer considers liquidatable or pre-liquidatable.
    #[instrument(skip(self, market_ids), fields(markets = market_ids.len()))]
    pub async fn fetch_liquidatable_positions(
        &self,
        chain_id: u64,
        market_ids: &[B256],
    ) -> Result<LiquidatablePositions> {
        if market_ids.is_empty() {
            return Ok(LiquidatablePositions::default());
        }

        let url = format!("{}/chain/{}/liquidatable-positions", self.base_url, chain_id);
        let positions: LiquidatablePositions = self
            .client
            .post(&url)
            .json(&LiquidatablePositionsRequest { market_ids })
            .send()
            .await?
            .error_for_status()
            .context("Failed to fetch liquidatable positions")?
            .json()
            .await?;

        debug!(
            liquidatable = positions.liquidatable_positions.len(),
            pre_liquidatable = positions.pre_liquidatable_positions.len(),
            "Fetched liquidatable positions"
        );
        Ok(positions)
    }
}

/// `U256` as a decimal string; numbers are accepted on input.
pub mod decimal_u256 {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNumber {
            String(String),
            Number(u64),
        }

        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
            StringOrNumber::Number(n) => Ok(U256::from(n)),
        }
    }
}
