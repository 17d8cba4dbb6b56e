//! Liquidator core logic.
//!
//! This crate provides the liquidation bot's computation and orchestration:
//! - Fixed-point math and the adaptive-curve IRM
//! - Market accrual (ledger replication)
//! - Hard and pre-liquidation eligibility
//! - Market evaluation and the position health view
//! - The execution guard with its cooldown table
//! - Per-chain scanner orchestration
//! - Configuration (profiles, chains, secrets)

mod candidate;
pub mod config;
mod cooldown;
pub mod eligibility;
pub mod engine;
pub mod irm;
mod liquidator;
pub mod market;
pub mod math;
mod scanner;

pub use candidate::{candidates, LiquidationCandidate, LiquidationKind};
pub use config::{
    chain_ids_from_env, config, init_config, BotConfig, ChainConfig, ChainSecrets, ConfigError,
};
pub use cooldown::CooldownTable;
pub use eligibility::{
    best_pre_liquidation, liquidation_incentive_factor, liquidation_values, pre_liquidation_values,
    BorrowPosition, LiquidationValues, PricedPreLiquidation,
};
pub use engine::{evaluate_market, top_positions, Authorizations, MarketSnapshot, PositionHealth};
pub use liquidator::{AttemptOutcome, Liquidator};
pub use market::{market_id, Market, MarketState, Position, PreLiquidation, PreLiquidationParams};
pub use scanner::{PassReport, PositionSource, Scanner, ScannerSettings};
