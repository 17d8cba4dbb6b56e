//! Gas pricing for liquidation transactions.
//!
//! Chains pick a [`GasModel`] in their config. The same [`GasParams`] feed
//! both the submitted transaction and the profit check's gas cost estimate.

mod eip1559;
mod legacy;

pub use eip1559::Eip1559GasStrategy;
pub use legacy::LegacyGasStrategy;

use alloy::primitives::U256;
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

const GWEI: f64 = 1e9;

/// Snapshot of gas prices for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasParams {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
        base_fee: u128,
    },
}

impl GasParams {
    /// Upper bound of the per-gas price actually paid.
    pub fn effective_gas_price(&self) -> u128 {
        match self {
            Self::Legacy { gas_price } => *gas_price,
            Self::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
                base_fee,
            } => (*base_fee + *max_priority_fee_per_gas).min(*max_fee_per_gas),
        }
    }

    /// Native-token cost of `gas_used` at this price.
    pub fn cost(&self, gas_used: u64) -> U256 {
        U256::from(self.effective_gas_price()) * U256::from(gas_used)
    }
}

#[async_trait]
pub trait GasStrategy: Send + Sync + Debug {
    /// Query current prices from the node at `rpc_url`.
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams>;

    /// Write the price fields onto `tx`.
    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams);

    fn strategy_name(&self) -> &'static str;
}

/// Transaction type used on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasModel {
    Legacy,
    #[default]
    #[serde(alias = "eip-1559")]
    Eip1559,
}

fn default_gas_price_gwei() -> f64 {
    1.0
}

fn default_max_gas_price_gwei() -> f64 {
    200.0
}

/// Per-chain gas settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    #[serde(default)]
    pub model: GasModel,
    /// Fallback price when the node does not answer (legacy).
    #[serde(default = "default_gas_price_gwei")]
    pub default_gas_price_gwei: f64,
    /// Hard cap on the per-gas price.
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: f64,
    /// Tip used when `eth_maxPriorityFeePerGas` is unavailable.
    #[serde(default)]
    pub priority_fee_gwei: Option<f64>,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            model: GasModel::default(),
            default_gas_price_gwei: default_gas_price_gwei(),
            max_gas_price_gwei: default_max_gas_price_gwei(),
            priority_fee_gwei: None,
        }
    }
}

impl GasConfig {
    pub fn legacy(default_gwei: f64, max_gwei: f64) -> Self {
        Self {
            model: GasModel::Legacy,
            default_gas_price_gwei: default_gwei,
            max_gas_price_gwei: max_gwei,
            priority_fee_gwei: None,
        }
    }

    pub fn eip1559(priority_gwei: f64, max_gwei: f64) -> Self {
        Self {
            model: GasModel::Eip1559,
            default_gas_price_gwei: default_gas_price_gwei(),
            max_gas_price_gwei: max_gwei,
            priority_fee_gwei: Some(priority_gwei),
        }
    }

    /// Build the strategy described by this config.
    pub fn strategy(&self) -> Box<dyn GasStrategy> {
        let max_wei = (self.max_gas_price_gwei * GWEI) as u128;
        match self.model {
            GasModel::Legacy => Box::new(LegacyGasStrategy::new(
                (self.default_gas_price_gwei * GWEI) as u128,
                max_wei,
            )),
            GasModel::Eip1559 => {
                let tip = self.priority_fee_gwei.unwrap_or(0.01);
                Box::new(Eip1559GasStrategy::new((tip * GWEI) as u128, 2.0).with_max_fee_cap(max_wei))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_price_and_cost() {
        let legacy = GasParams::Legacy {
            gas_price: 3_000_000_000,
        };
        assert_eq!(legacy.effective_gas_price(), 3_000_000_000);
        assert_eq!(legacy.cost(100_000), U256::from(300_000_000_000_000u64));

        // base + tip, bounded by max fee
        let eip1559 = GasParams::Eip1559 {
            max_fee_per_gas: 50_000_000_000,
            max_priority_fee_per_gas: 2_000_000_000,
            base_fee: 30_000_000_000,
        };
        assert_eq!(eip1559.effective_gas_price(), 32_000_000_000);

        let capped = GasParams::Eip1559 {
            max_fee_per_gas: 10_000_000_000,
            max_priority_fee_per_gas: 2_000_000_000,
            base_fee: 30_000_000_000,
        };
        assert_eq!(capped.effective_gas_price(), 10_000_000_000);
    }

    #[test]
    fn test_strategy_from_config() {
        assert_eq!(GasConfig::legacy(1.0, 10.0).strategy().strategy_name(), "Legacy");
        assert_eq!(GasConfig::eip1559(0.1, 100.0).strategy().strategy_name(), "EIP-1559");
        assert_eq!(GasConfig::default().model, GasModel::Eip1559);
    }

    #[test]
    fn test_gas_config_deserialize() {
        let config: GasConfig = parse(r#"{"model":"legacy","max_gas_price_gwei":5.0}"#);
        assert_eq!(config.model, GasModel::Legacy);
        assert_eq!(config.max_gas_price_gwei, 5.0);
        assert_eq!(config.default_gas_price_gwei, 1.0);
        assert!(config.priority_fee_gwei.is_none());
    }

    fn parse(json: &str) -> GasConfig {
        serde_json::from_str(json).unwrap()
    }
}
