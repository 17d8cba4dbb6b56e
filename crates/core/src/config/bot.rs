//! Runtime tuning with profile support.
//!
//! Profiles (testing, production, aggressive) trade safety margins for
//! speed. `BOT_PROFILE` selects one by name or points at a TOML file.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Pass scheduling and fan-out
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Execution guard parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    /// Indexer endpoint
    #[serde(default)]
    pub indexer: IndexerConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Pass scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Run a pass every N new blocks
    #[serde(default = "default_block_interval")]
    pub block_interval: u64,

    /// Block polling period when no WebSocket endpoint is set (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Liquidation attempts running at once within a pass
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: usize,

    /// Market ids per liquidatable-positions request
    #[serde(default = "default_markets_per_request")]
    pub markets_per_request: usize,
}

fn default_block_interval() -> u64 {
    1
}
fn default_poll_interval() -> u64 {
    2_000
}
fn default_max_concurrent_positions() -> usize {
    8
}
fn default_markets_per_request() -> usize {
    50
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            block_interval: default_block_interval(),
            poll_interval_ms: default_poll_interval(),
            max_concurrent_positions: default_max_concurrent_positions(),
            markets_per_request: default_markets_per_request(),
        }
    }
}

impl ScannerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Execution guard parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Minimum attempt spacing per (market, user) in seconds; 0 disables
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Profit must exceed this to execute, when profit checking is on
    #[serde(default = "default_min_profit")]
    pub min_profit_usd: f64,

    /// Re-read market and position state on-chain before building the batch
    #[serde(default = "default_recompute_locally")]
    pub recompute_locally: bool,

    /// Gas limit = simulated gas * multiplier
    #[serde(default = "default_gas_limit_multiplier")]
    pub gas_limit_multiplier: f64,

    /// Upper bound on one attempt, receipt wait included (seconds)
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// How long to wait for a submitted transaction to be mined (seconds)
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
}

fn default_cooldown() -> u64 {
    60
}
fn default_min_profit() -> f64 {
    0.0
}
fn default_recompute_locally() -> bool {
    true
}
fn default_gas_limit_multiplier() -> f64 {
    1.2
}
fn default_attempt_timeout() -> u64 {
    180
}
fn default_receipt_timeout() -> u64 {
    120
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            min_profit_usd: default_min_profit(),
            recompute_locally: default_recompute_locally(),
            gas_limit_multiplier: default_gas_limit_multiplier(),
            attempt_timeout_secs: default_attempt_timeout(),
            receipt_timeout_secs: default_receipt_timeout(),
        }
    }
}

impl LiquidationConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_indexer_url")]
    pub base_url: String,

    #[serde(default = "default_indexer_timeout")]
    pub timeout_secs: u64,
}

fn default_indexer_url() -> String {
    "http://localhost:42069".to_string()
}
fn default_indexer_timeout() -> u64 {
    10
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: default_indexer_url(),
            timeout_secs: default_indexer_timeout(),
        }
    }
}

impl IndexerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            scanner: ScannerConfig::default(),
            liquidation: LiquidationConfig::default(),
            indexer: IndexerConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Short cooldown, no profit floor, local checks on.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            scanner: ScannerConfig {
                block_interval: 1,
                poll_interval_ms: 1_000,
                max_concurrent_positions: 2,
                markets_per_request: 10,
            },
            liquidation: LiquidationConfig {
                cooldown_secs: 10,
                min_profit_usd: 0.0,
                recompute_locally: true,
                gas_limit_multiplier: 1.5,
                attempt_timeout_secs: 60,
                receipt_timeout_secs: 45,
            },
            indexer: IndexerConfig::default(),
        }
    }

    /// Conservative settings.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            scanner: ScannerConfig::default(),
            liquidation: LiquidationConfig {
                cooldown_secs: 120,
                min_profit_usd: 1.0,
                recompute_locally: true,
                gas_limit_multiplier: 1.2,
                attempt_timeout_secs: 180,
                receipt_timeout_secs: 120,
            },
            indexer: IndexerConfig::default(),
        }
    }

    /// Maximum speed: wider fan-out, trusts indexer values.
    pub fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            scanner: ScannerConfig {
                block_interval: 1,
                poll_interval_ms: 500,
                max_concurrent_positions: 32,
                markets_per_request: 100,
            },
            liquidation: LiquidationConfig {
                cooldown_secs: 12,
                min_profit_usd: 0.5,
                recompute_locally: false,
                gas_limit_multiplier: 1.3,
                attempt_timeout_secs: 45,
                receipt_timeout_secs: 30,
            },
            indexer: IndexerConfig {
                timeout_secs: 5,
                ..Default::default()
            },
        }
    }

    /// Named profile, or `None` for unknown names.
    pub fn named(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "testing" | "test" => Some(Self::testing()),
            "production" | "prod" => Some(Self::production()),
            "aggressive" | "aggro" => Some(Self::aggressive()),
            "default" => Some(Self::default()),
            _ => None,
        }
    }

    /// Profile from `BOT_PROFILE`: a profile name or a TOML path.
    /// Falls back to defaults when unset or unreadable.
    pub fn from_env() -> Self {
        let Ok(profile) = std::env::var("BOT_PROFILE") else {
            return Self::default();
        };
        if let Some(config) = Self::named(&profile) {
            return config;
        }
        match Self::from_file(&profile) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(profile = %profile, error = %e, "Unknown BOT_PROFILE, using defaults");
                Self::default()
            }
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            block_interval = self.scanner.block_interval,
            poll_interval_ms = self.scanner.poll_interval_ms,
            max_concurrent = self.scanner.max_concurrent_positions,
            markets_per_request = self.scanner.markets_per_request,
            "Scanner"
        );
        tracing::info!(
            cooldown_secs = self.liquidation.cooldown_secs,
            min_profit = self.liquidation.min_profit_usd,
            recompute_locally = self.liquidation.recompute_locally,
            gas_limit_multiplier = self.liquidation.gas_limit_multiplier,
            attempt_timeout_secs = self.liquidation.attempt_timeout_secs,
            receipt_timeout_secs = self.liquidation.receipt_timeout_secs,
            "Liquidation parameters"
        );
        tracing::info!(url = %self.indexer.base_url, "Indexer");
    }
}

static GLOBAL_CONFIG: OnceLock<BotConfig> = OnceLock::new();

/// Initialize global configuration. Later calls are ignored.
pub fn init_config(config: BotConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

/// Get the global configuration, initializing from environment if needed.
pub fn config() -> &'static BotConfig {
    GLOBAL_CONFIG.get_or_init(BotConfig::from_env)
}
