//! Morpho GraphQL API pricer.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{Pricer, DEFAULT_REQUEST_TIMEOUT};

const DEFAULT_API_URL: &str = "https://blue-api.morpho.org/graphql";

#[derive(Debug, Serialize)]
struct GraphQlRequest {
    query: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ChainsData {
    chains: Vec<ChainItem>,
}

#[derive(Debug, Deserialize)]
struct ChainItem {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct AssetsData {
    assets: AssetItems,
}

#[derive(Debug, Deserialize)]
struct AssetItems {
    #[serde(default)]
    items: Vec<AssetItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetItem {
    address: Address,
    price_usd: Option<f64>,
}

#[derive(Debug)]
pub struct MorphoApiPricer {
    client: reqwest::Client,
    api_url: String,
    timeout: Duration,
    /// Chains served by the API, fetched on first use.
    chains: OnceCell<Vec<u64>>,
}

impl Default for MorphoApiPricer {
    fn default() -> Self {
        Self::new()
    }
}

impl MorphoApiPricer {
    pub fn new() -> Self {
        Self::with_api_url(DEFAULT_API_URL)
    }

    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            chains: OnceCell::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn query<T: for<'de> Deserialize<'de>>(&self, query: String) -> Result<T> {
        let response: GraphQlResponse<T> = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .json(&GraphQlRequest { query })
            .send()
            .await?
            .error_for_status()
            .context("Morpho API request failed")?
            .json()
            .await?;
        Ok(response.data)
    }

    fn asset_query(chain_id: u64, asset: Address) -> String {
        format!(
            r#"query {{ assets(where: {{ address_in: ["{asset}"], chainId_in: [{chain_id}] }}) {{ items {{ address priceUsd }} }} }}"#
        )
    }
}

#[async_trait]
impl Pricer for MorphoApiPricer {
    fn name(&self) -> &'static str {
        "morpho_api"
    }

    async fn supports_chain(&self, chain_id: u64) -> Result<bool> {
        let chains = self
            .chains
            .get_or_try_init(|| async {
                let data: ChainsData = self.query("query { chains { id } }".to_string()).await?;
                Ok::<_, anyhow::Error>(data.chains.into_iter().map(|c| c.id).collect())
            })
            .await?;
        Ok(chains.contains(&chain_id))
    }

    async fn supports_asset(&self, chain_id: u64, _asset: Address) -> Result<bool> {
        self.supports_chain(chain_id).await
    }

    async fn price(&self, chain_id: u64, asset: Address) -> Result<Option<f64>> {
        let data: AssetsData = self.query(Self::asset_query(chain_id, asset)).await?;
        Ok(data
            .assets
            .items
            .into_iter()
            .find(|item| item.address == asset)
            .and_then(|item| item.price_usd))
    }
}
