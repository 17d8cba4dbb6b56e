//! Single `gasPrice` transactions for chains without EIP-1559.

use super::{GasParams, GasStrategy};
use alloy::network::TransactionBuilder;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LegacyGasStrategy {
    /// Used when `eth_gasPrice` fails.
    fallback_gas_price: u128,
    max_gas_price: u128,
}

impl LegacyGasStrategy {
    pub fn new(fallback_gas_price: u128, max_gas_price: u128) -> Self {
        Self {
            fallback_gas_price,
            max_gas_price,
        }
    }

    fn bounded(&self, gas_price: u128) -> u128 {
        gas_price.min(self.max_gas_price)
    }
}

#[async_trait]
impl GasStrategy for LegacyGasStrategy {
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams> {
        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let gas_price = match provider.get_gas_price().await {
            Ok(price) => price,
            Err(e) => {
                debug!(error = %e, "eth_gasPrice failed, using fallback");
                self.fallback_gas_price
            }
        };

        Ok(GasParams::Legacy {
            gas_price: self.bounded(gas_price),
        })
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        let gas_price = match params {
            GasParams::Legacy { gas_price } => *gas_price,
            GasParams::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        };
        tx.set_gas_price(self.bounded(gas_price));
    }

    fn strategy_name(&self) -> &'static str {
        "Legacy"
    }
}
