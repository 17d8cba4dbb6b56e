//! DefiLlama coins API pricer.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{Pricer, DEFAULT_REQUEST_TIMEOUT};

const DEFAULT_API_URL: &str = "https://coins.llama.fi";

#[derive(Debug, Deserialize)]
struct PricesResponse {
    #[serde(default)]
    coins: HashMap<String, CoinPrice>,
}

#[derive(Debug, Deserialize)]
struct CoinPrice {
    price: f64,
}

#[derive(Debug, Clone)]
pub struct DefiLlamaPricer {
    client: reqwest::Client,
    api_url: String,
    timeout: Duration,
}

impl Default for DefiLlamaPricer {
    fn default() -> Self {
        Self::new()
    }
}

impl DefiLlamaPricer {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// DefiLlama chain slug.
    pub fn chain_slug(chain_id: u64) -> Option<&'static str> {
        match chain_id {
            1 => Some("ethereum"),
            10 => Some("optimism"),
            130 => Some("unichain"),
            137 => Some("polygon"),
            8453 => Some("base"),
            42161 => Some("arbitrum"),
            747474 => Some("katana"),
            _ => None,
        }
    }

    fn coin_key(chain_id: u64, asset: Address) -> Option<String> {
        Self::chain_slug(chain_id).map(|slug| format!("{slug}:{asset}"))
    }
}

#[async_trait]
impl Pricer for DefiLlamaPricer {
    fn name(&self) -> &'static str {
        "defillama"
    }

    async fn supports_chain(&self, chain_id: u64) -> Result<bool> {
        Ok(Self::chain_slug(chain_id).is_some())
    }

    /// Coverage is only known by asking for a price; `price` returns `None`
    /// for unlisted assets, so every asset on a listed chain is accepted here.
    async fn supports_asset(&self, chain_id: u64, _asset: Address) -> Result<bool> {
        Ok(Self::chain_slug(chain_id).is_some())
    }

    async fn price(&self, chain_id: u64, asset: Address) -> Result<Option<f64>> {
        let Some(key) = Self::coin_key(chain_id, asset) else {
            return Ok(None);
        };

        let url = format!("{}/prices/current/{}", self.api_url, key);
        let response: PricesResponse = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()
            .context("DefiLlama request failed")?
            .json()
            .await?;

        // Keys echo the request casing but may be normalized; match loosely.
        Ok(response
            .coins
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
            .map(|(_, coin)| coin.price))
    }
}
