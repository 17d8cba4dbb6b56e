//! Liquidator chain interaction layer.
//!
//! This crate provides:
//! - Contract bindings for Morpho Blue, pre-liquidation, IRM, oracles and venues
//! - The executor call encoder
//! - A read seam (`ChainReader`) and its RPC implementation
//! - Liquidity venues and the ordered conversion pipeline
//! - Bundle simulation via `eth_simulateV1`
//! - Transaction signing and sending with Legacy or EIP-1559 gas
//! - New-block notifications over WebSocket or polling

mod blocks;
pub mod contracts;
pub mod executor;
pub mod gas;
mod provider;
mod reader;
mod signer;
mod simulation;
pub mod venue;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use blocks::{BlockStream, BlockWatcher, ScanSchedule};
pub use contracts::MarketParams;
pub use executor::{encode_callbacks, Call, ExecutorEncoder};
pub use gas::{GasConfig, GasModel, GasParams};
pub use provider::ProviderManager;
pub use reader::{ChainReader, MarketStateRaw, PositionRaw};
pub use signer::{NonceManager, Submitter, TransactionSender, TransactionSenderBuilder};
pub use simulation::{BundleSimulator, RpcSimulator, SimulationOutcome, SimulationRequest};
pub use venue::{
    Conversion, ConversionPipeline, Erc20WrapperVenue, Erc4626Venue, LiquidityVenue, ToConvert,
    UniswapV3Addresses, UniswapV3Venue, VenueContext,
};
