//! Configuration for the multi-chain liquidation bot.
//!
//! - Bot runtime configuration (profiles, scheduling, execution thresholds)
//! - Chain configuration (deployment addresses, whitelists, RPC, gas, venues)
//! - Per-chain secrets from the environment

mod bot;
mod chain;
mod error;
mod secrets;

pub use bot::{config, init_config, BotConfig, IndexerConfig, LiquidationConfig, ScannerConfig};
pub use chain::{
    chain_ids_from_env, ChainConfig, RpcConfig, UniswapV3Config, VenueConfig, WrapperConfig,
};
pub use error::ConfigError;
pub use secrets::ChainSecrets;
