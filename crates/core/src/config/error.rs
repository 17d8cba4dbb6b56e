use thiserror::Error;

/// Startup configuration failures. Each one stops the affected chain from launching.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no chain config for chain {0}")]
    UnknownChain(u64),

    #[error("vault whitelist and additional markets whitelist both empty for chain {chain_id}")]
    EmptyWhitelist { chain_id: u64 },

    #[error("missing {name}")]
    MissingSecret { name: String },

    #[error("{name} is not a valid address: {value}")]
    InvalidAddress { name: String, value: String },

    #[error("profit checking is enabled for chain {chain_id} but no pricer is configured")]
    MissingPricers { chain_id: u64 },

    #[error("invalid chain id list {0:?}")]
    InvalidChainIds(String),

    #[error("failed to load {path}: {message}")]
    File { path: String, message: String },
}
