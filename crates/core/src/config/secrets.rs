//! Per-chain secrets from the environment.

use alloy::primitives::Address;
use std::fmt;

use super::{ChainConfig, ConfigError};

/// Endpoints and keys for one chain. The key never appears in `Debug` output.
#[derive(Clone)]
pub struct ChainSecrets {
    pub rpc_url: String,
    pub ws_url: Option<String>,
    pub executor: Address,
    pub private_key: String,
}

impl ChainSecrets {
    /// Read `RPC_URL_{id}`, `WS_URL_{id}`, `EXECUTOR_ADDRESS_{id}` and
    /// `LIQUIDATION_PRIVATE_KEY_{id}`. RPC URLs fall back to the chain config.
    pub fn from_env(chain: &ChainConfig) -> Result<Self, ConfigError> {
        Self::from_lookup(chain, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        chain: &ChainConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let id = chain.chain_id;
        let var = |prefix: &str| {
            let name = format!("{prefix}_{id}");
            let value = lookup(&name).filter(|v| !v.trim().is_empty());
            (name, value)
        };
        let required = |prefix: &str| match var(prefix) {
            (_, Some(value)) => Ok(value),
            (name, None) => Err(ConfigError::MissingSecret { name }),
        };

        let rpc_url = var("RPC_URL").1.unwrap_or_else(|| chain.rpc.http.clone());
        let ws_url = var("WS_URL").1.or_else(|| chain.rpc.ws.clone());

        let executor_name = format!("EXECUTOR_ADDRESS_{id}");
        let executor_raw = required("EXECUTOR_ADDRESS")?;
        let executor = executor_raw
            .trim()
            .parse::<Address>()
            .map_err(|_| ConfigError::InvalidAddress {
                name: executor_name,
                value: executor_raw.clone(),
            })?;

        let private_key = required("LIQUIDATION_PRIVATE_KEY")?;

        Ok(Self {
            rpc_url,
            ws_url,
            executor,
            private_key,
        })
    }
}

impl fmt::Debug for ChainSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainSecrets")
            .field("rpc_url", &self.rpc_url)
            .field("ws_url", &self.ws_url)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
