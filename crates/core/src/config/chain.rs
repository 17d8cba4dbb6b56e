//! Per-chain deployment configuration.

use alloy::primitives::{address, b256, Address, B256};
use liquidator_chain::{GasConfig, UniswapV3Addresses};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::ConfigError;

const MORPHO: Address = address!("BBBBBbbBBb9cC5e90e3b3Af64bdAF62C37EEFFCb");

/// Static data for one chain the bot runs on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    /// Morpho Blue singleton
    pub morpho: Address,
    /// Wrapped native token, used to price gas
    pub wnative: Address,
    /// Vaults whose withdraw queues define the markets to watch
    #[serde(default)]
    pub vault_whitelist: Vec<Address>,
    /// Markets watched regardless of vault membership
    #[serde(default)]
    pub additional_markets_whitelist: Vec<B256>,
    /// Gate execution on estimated USD profit
    #[serde(default)]
    pub check_profit: bool,
    pub rpc: RpcConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub venues: VenueConfig,
}

/// Default RPC endpoints; `RPC_URL_{id}` / `WS_URL_{id}` take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub http: String,
    #[serde(default)]
    pub ws: Option<String>,
}

/// Venue settings for the conversion pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Factory/router override; unset uses the known deployment for the chain
    #[serde(default)]
    pub uniswap_v3: Option<UniswapV3Config>,
    /// Wrapper tokens unwrapped with `withdrawTo`
    #[serde(default)]
    pub erc20_wrappers: Vec<WrapperConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UniswapV3Config {
    pub factory: Address,
    pub router: Address,
}

impl From<UniswapV3Config> for UniswapV3Addresses {
    fn from(config: UniswapV3Config) -> Self {
        Self {
            factory: config.factory,
            router: config.router,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WrapperConfig {
    pub wrapper: Address,
    pub underlying: Address,
}

impl VenueConfig {
    pub fn wrapper_map(&self) -> HashMap<Address, Address> {
        self.erc20_wrappers
            .iter()
            .map(|w| (w.wrapper, w.underlying))
            .collect()
    }
}

/// Contents of a `CHAINS_CONFIG` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChainsFile {
    #[serde(default)]
    chains: Vec<ChainConfig>,
}

impl ChainConfig {
    pub fn mainnet() -> Self {
        Self {
            chain_id: 1,
            name: "mainnet".to_string(),
            morpho: MORPHO,
            wnative: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            vault_whitelist: vec![
                address!("BEEF01735c132Ada46AA9aA4c54623cAA92A64CB"),
                address!("8eB67A509616cd6A7c1B3c8C21D48FF57df3d458"),
            ],
            additional_markets_whitelist: vec![b256!(
                "1eda1b67414336cab3914316cb58339ddaef9e43f939af1fed162a989c98bc20"
            )],
            check_profit: true,
            rpc: RpcConfig {
                http: "https://eth.merkle.io".to_string(),
                ws: None,
            },
            gas: GasConfig::eip1559(1.0, 100.0),
            venues: VenueConfig::default(),
        }
    }

    pub fn base() -> Self {
        Self {
            chain_id: 8453,
            name: "base".to_string(),
            morpho: MORPHO,
            wnative: address!("4200000000000000000000000000000000000006"),
            vault_whitelist: vec![address!("beeF010f9cb27031ad51e3333f9aF9C6B1228183")],
            additional_markets_whitelist: Vec::new(),
            check_profit: false,
            rpc: RpcConfig {
                http: "https://mainnet.base.org".to_string(),
                ws: None,
            },
            gas: GasConfig::eip1559(0.001, 5.0),
            venues: VenueConfig::default(),
        }
    }

    pub fn builtin(chain_id: u64) -> Option<Self> {
        match chain_id {
            1 => Some(Self::mainnet()),
            8453 => Some(Self::base()),
            _ => None,
        }
    }

    /// Config for `chain_id`: the `CHAINS_CONFIG` file first, then built-ins.
    pub fn load(chain_id: u64) -> Result<Self, ConfigError> {
        let from_file = match std::env::var("CHAINS_CONFIG") {
            Ok(path) => Self::from_file(&path)?
                .into_iter()
                .find(|c| c.chain_id == chain_id),
            Err(_) => None,
        };

        let config = from_file
            .or_else(|| Self::builtin(chain_id))
            .ok_or(ConfigError::UnknownChain(chain_id))?;
        config.validate()?;
        Ok(config)
    }

    /// All chains defined in a TOML file (`[[chains]]` tables), with
    /// `${VAR}` references expanded.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Vec<Self>, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::File {
            path: path_str.clone(),
            message: e.to_string(),
        })?;
        Self::parse_chains(&content).map_err(|message| ConfigError::File {
            path: path_str,
            message,
        })
    }

    fn parse_chains(content: &str) -> Result<Vec<Self>, String> {
        let expanded = expand_env(content);
        let file: ChainsFile = toml::from_str(&expanded).map_err(|e| e.to_string())?;
        Ok(file.chains)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault_whitelist.is_empty() && self.additional_markets_whitelist.is_empty() {
            return Err(ConfigError::EmptyWhitelist {
                chain_id: self.chain_id,
            });
        }
        Ok(())
    }

    /// Profit checking needs at least one pricer.
    pub fn validate_pricers(&self, pricer_count: usize) -> Result<(), ConfigError> {
        if self.check_profit && pricer_count == 0 {
            return Err(ConfigError::MissingPricers {
                chain_id: self.chain_id,
            });
        }
        Ok(())
    }
}

/// Chain ids from `CHAIN_IDS` (comma separated), defaulting to mainnet.
pub fn chain_ids_from_env() -> Result<Vec<u64>, ConfigError> {
    match std::env::var("CHAIN_IDS") {
        Ok(value) => parse_chain_ids(&value),
        Err(_) => Ok(vec![1]),
    }
}

fn parse_chain_ids(value: &str) -> Result<Vec<u64>, ConfigError> {
    let ids = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ConfigError::InvalidChainIds(value.to_string()))?;
    if ids.is_empty() {
        return Err(ConfigError::InvalidChainIds(value.to_string()));
    }
    Ok(ids)
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
/// Unset variables are left as written.
pub(crate) fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") else {
        return s.to_string();
    };
    re.replace_all(s, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
