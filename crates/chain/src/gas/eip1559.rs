//! Type-2 transactions priced from the latest base fee.

use super::{GasParams, GasStrategy};
use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionBuilder;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use anyhow::{anyhow, Result};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct Eip1559GasStrategy {
    /// Tip used when the node does not suggest one.
    default_priority_fee: u128,
    /// `max_fee = base_fee * multiplier + tip`
    base_fee_multiplier: f64,
    max_fee_cap: u128,
}

impl Eip1559GasStrategy {
    pub fn new(default_priority_fee: u128, base_fee_multiplier: f64) -> Self {
        Self {
            default_priority_fee,
            base_fee_multiplier,
            max_fee_cap: 500_000_000_000,
        }
    }

    pub fn with_max_fee_cap(mut self, cap: u128) -> Self {
        self.max_fee_cap = cap;
        self
    }

    fn max_fee(&self, base_fee: u128, priority_fee: u128) -> u128 {
        let scaled = (base_fee as f64 * self.base_fee_multiplier) as u128;
        (scaled + priority_fee).min(self.max_fee_cap)
    }
}

#[async_trait]
impl GasStrategy for Eip1559GasStrategy {
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams> {
        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);

        let block = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| anyhow!("Latest block unavailable"))?;
        let base_fee = block
            .header
            .base_fee_per_gas
            .map(u128::from)
            .ok_or_else(|| anyhow!("Chain reports no base fee"))?;

        let priority_fee = provider
            .get_max_priority_fee_per_gas()
            .await
            .unwrap_or(self.default_priority_fee);
        let max_fee_per_gas = self.max_fee(base_fee, priority_fee);

        Ok(GasParams::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas: priority_fee.min(max_fee_per_gas),
            base_fee,
        })
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        match params {
            GasParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
                ..
            } => {
                tx.set_max_fee_per_gas(*max_fee_per_gas);
                tx.set_max_priority_fee_per_gas(*max_priority_fee_per_gas);
            }
            GasParams::Legacy { gas_price } => {
                tx.set_max_fee_per_gas(*gas_price);
                tx.set_max_priority_fee_per_gas(self.default_priority_fee.min(*gas_price));
            }
        }
    }

    fn strategy_name(&self) -> &'static str {
        "EIP-1559"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn test_max_fee_from_base_fee() {
        let strategy = Eip1559GasStrategy::new(1_000_000_000, 2.0);
        assert_eq!(strategy.max_fee(10_000_000_000, 1_000_000_000), 21_000_000_000);

        let capped = strategy.with_max_fee_cap(15_000_000_000);
        assert_eq!(capped.max_fee(10_000_000_000, 1_000_000_000), 15_000_000_000);
    }

    #[test]
    fn test_eip1559_apply_gas() {
        let strategy = Eip1559GasStrategy::new(1_000_000_000, 2.0);
        let mut tx = TransactionRequest::default().with_to(Address::ZERO);

        strategy.apply_gas(
            &mut tx,
            &GasParams::Eip1559 {
                max_fee_per_gas: 21_000_000_000,
                max_priority_fee_per_gas: 1_000_000_000,
                base_fee: 10_000_000_000,
            },
        );
        assert_eq!(tx.max_fee_per_gas, Some(21_000_000_000));
        assert_eq!(tx.max_priority_fee_per_gas, Some(1_000_000_000));
    }

    #[test]
    fn test_legacy_params_fall_back() {
        let strategy = Eip1559GasStrategy::new(5_000_000_000, 2.0);
        let mut tx = TransactionRequest::default();

        strategy.apply_gas(
            &mut tx,
            &GasParams::Legacy {
                gas_price: 3_000_000_000,
            },
        );
        assert_eq!(tx.max_fee_per_gas, Some(3_000_000_000));
        assert_eq!(tx.max_priority_fee_per_gas, Some(3_000_000_000));
    }
}
