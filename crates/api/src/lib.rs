//! HTTP collaborators of the liquidation bot.
//!
//! This crate provides clients for:
//! - The Morpho Blue indexer: vault withdraw queues and liquidatable positions
//! - USD pricers (Morpho API, DefiLlama) used by the profit check

mod indexer;
pub mod pricer;

pub use indexer::{
    decimal_u256, IndexerClient, LiquidatablePosition, LiquidatablePositions, MarketParamsData,
    PositionData, PreLiquidatablePosition, PreLiquidationData, PreLiquidationParamsData,
};
pub use pricer::{DefiLlamaPricer, MorphoApiPricer, Pricer, PricerRegistry};
