//! USD pricing for the profit check.

mod defillama;
mod morpho_api;

pub use defillama::DefiLlamaPricer;
pub use morpho_api::MorphoApiPricer;

use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request bound for pricer HTTP calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Pricer: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    async fn supports_chain(&self, chain_id: u64) -> Result<bool>;

    async fn supports_asset(&self, chain_id: u64, asset: Address) -> Result<bool>;

    /// USD price of one whole unit of `asset`, if known.
    async fn price(&self, chain_id: u64, asset: Address) -> Result<Option<f64>>;
}

/// Pricers queried in order; the first one to return a price wins.
#[derive(Debug, Clone, Default)]
pub struct PricerRegistry {
    pricers: Vec<Arc<dyn Pricer>>,
}

impl PricerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pricer(mut self, pricer: impl Pricer + 'static) -> Self {
        self.pricers.push(Arc::new(pricer));
        self
    }

    pub fn with_shared_pricer(mut self, pricer: Arc<dyn Pricer>) -> Self {
        self.pricers.push(pricer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pricers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pricers.len()
    }

    /// Errors from individual pricers are logged and skipped.
    pub async fn price(&self, chain_id: u64, asset: Address) -> Option<f64> {
        for pricer in &self.pricers {
            match self.try_pricer(pricer.as_ref(), chain_id, asset).await {
                Ok(Some(price)) => {
                    debug!(pricer = pricer.name(), asset = %asset, price, "Priced asset");
                    return Some(price);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(pricer = pricer.name(), asset = %asset, error = %e, "Pricer failed");
                }
            }
        }
        None
    }

    async fn try_pricer(&self, pricer: &dyn Pricer, chain_id: u64, asset: Address) -> Result<Option<f64>> {
        if !pricer.supports_chain(chain_id).await? || !pricer.supports_asset(chain_id, asset).await? {
            return Ok(None);
        }
        pricer.price(chain_id, asset).await
    }
}
