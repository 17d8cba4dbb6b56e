//! Per-chain pass orchestration.
//!
//! A pass resolves the watched markets, fetches candidates from the indexer
//! and runs the execution guard on each of them. Passes are triggered by new
//! blocks and never overlap for one chain.

use alloy::primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use liquidator_api::{IndexerClient, LiquidatablePositions};
use liquidator_chain::{BlockStream, ScanSchedule};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::candidate::{candidates, LiquidationCandidate};
use crate::config::{BotConfig, ChainConfig};
use crate::liquidator::{AttemptOutcome, Liquidator};

/// Where candidates come from.
#[async_trait]
pub trait PositionSource: Send + Sync + Debug {
    async fn withdraw_queue(&self, chain_id: u64, vault: Address) -> Result<Vec<B256>>;

    async fn liquidatable_positions(
        &self,
        chain_id: u64,
        market_ids: &[B256],
    ) -> Result<LiquidatablePositions>;
}

#[async_trait]
impl PositionSource for IndexerClient {
    async fn withdraw_queue(&self, chain_id: u64, vault: Address) -> Result<Vec<B256>> {
        self.fetch_withdraw_queue(chain_id, vault).await
    }

    async fn liquidatable_positions(
        &self,
        chain_id: u64,
        market_ids: &[B256],
    ) -> Result<LiquidatablePositions> {
        self.fetch_liquidatable_positions(chain_id, market_ids).await
    }
}

/// What the scanner watches and how wide it fans out.
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub chain_id: u64,
    pub vault_whitelist: Vec<Address>,
    pub additional_markets: Vec<B256>,
    pub block_interval: u64,
    pub max_concurrent_positions: usize,
    pub markets_per_request: usize,
    /// Upper bound on one attempt, submission included
    pub attempt_timeout: Duration,
}

impl ScannerSettings {
    pub fn new(chain: &ChainConfig, bot: &BotConfig) -> Self {
        Self {
            chain_id: chain.chain_id,
            vault_whitelist: chain.vault_whitelist.clone(),
            additional_markets: chain.additional_markets_whitelist.clone(),
            block_interval: bot.scanner.block_interval.max(1),
            max_concurrent_positions: bot.scanner.max_concurrent_positions.max(1),
            markets_per_request: bot.scanner.markets_per_request.max(1),
            attempt_timeout: bot.liquidation.attempt_timeout(),
        }
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub markets: usize,
    pub candidates: usize,
    /// Attempt count per outcome label
    pub outcomes: BTreeMap<&'static str, usize>,
    /// Attempts that failed on a chain or API read
    pub errors: usize,
}

impl PassReport {
    pub fn count(&self, label: &str) -> usize {
        self.outcomes.get(label).copied().unwrap_or(0)
    }
}

/// Clears the in-flight flag when the pass ends, even on panic.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct Scanner {
    settings: ScannerSettings,
    source: Arc<dyn PositionSource>,
    liquidator: Arc<Liquidator>,
    in_flight: AtomicBool,
}

impl Scanner {
    pub fn new(
        settings: ScannerSettings,
        source: Arc<dyn PositionSource>,
        liquidator: Arc<Liquidator>,
    ) -> Self {
        Self {
            settings,
            source,
            liquidator,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    fn begin_pass(&self) -> Option<PassGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(&self.in_flight))
    }

    /// Drive passes from a block stream until it ends.
    ///
    /// Each pass runs in its own task so the stream keeps draining; ticks
    /// that arrive while a pass is in flight are skipped.
    pub async fn run(self: Arc<Self>, mut blocks: BlockStream) {
        let chain_id = self.settings.chain_id;
        let mut schedule = ScanSchedule::new(self.settings.block_interval);

        info!(chain_id, interval = self.settings.block_interval, "Scanner started");

        while let Some(block) = blocks.next().await {
            if !schedule.observe() {
                continue;
            }

            let scanner = Arc::clone(&self);
            tokio::spawn(async move {
                match scanner.run_pass().await {
                    Some(report) => debug!(chain_id, block, ?report, "Pass complete"),
                    None => debug!(chain_id, block, "Previous pass still running, skipping block"),
                }
            });
        }

        warn!(chain_id, "Block stream ended, scanner stopped");
    }

    /// One pass. `None` if another pass is still running.
    #[instrument(skip(self), fields(chain_id = self.settings.chain_id))]
    pub async fn run_pass(&self) -> Option<PassReport> {
        let _guard = self.begin_pass()?;
        let start = Instant::now();

        let markets = self.resolve_markets().await;
        let candidates = self.fetch_candidates(&markets).await;

        let mut report = PassReport {
            markets: markets.len(),
            candidates: candidates.len(),
            ..Default::default()
        };

        let results: Vec<Result<AttemptOutcome>> = stream::iter(candidates)
            .map(|candidate| async move {
                let attempt = self.liquidator.attempt(&candidate);
                let result = match tokio::time::timeout(self.settings.attempt_timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            market = %candidate.market_id,
                            user = %candidate.user,
                            timeout_secs = self.settings.attempt_timeout.as_secs(),
                            "Liquidation attempt timed out"
                        );
                        Ok(AttemptOutcome::TimedOut)
                    }
                };
                if let Err(e) = &result {
                    warn!(market = %candidate.market_id, user = %candidate.user, error = %e, "Liquidation attempt failed");
                }
                result
            })
            .buffer_unordered(self.settings.max_concurrent_positions)
            .collect()
            .await;

        for result in results {
            match result {
                Ok(outcome) => *report.outcomes.entry(outcome.label()).or_default() += 1,
                Err(_) => report.errors += 1,
            }
        }

        self.liquidator.cooldown().purge_expired();

        if report.candidates > 0 {
            info!(
                markets = report.markets,
                candidates = report.candidates,
                executed = report.count("executed"),
                errors = report.errors,
                elapsed_ms = start.elapsed().as_millis(),
                "Pass finished"
            );
        }
        Some(report)
    }

    /// Withdraw-queue markets of all whitelisted vaults plus the additional
    /// markets, deduplicated in first-seen order. Failing vaults are skipped.
    async fn resolve_markets(&self) -> Vec<B256> {
        let chain_id = self.settings.chain_id;
        let queues = join_all(
            self.settings
                .vault_whitelist
                .iter()
                .map(|vault| self.source.withdraw_queue(chain_id, *vault)),
        )
        .await;

        let mut seen = HashSet::new();
        let mut markets = Vec::new();
        for (vault, queue) in self.settings.vault_whitelist.iter().zip(queues) {
            match queue {
                Ok(queue) => markets.extend(queue.into_iter().filter(|id| seen.insert(*id))),
                Err(e) => warn!(vault = %vault, error = %e, "Failed to fetch withdraw queue"),
            }
        }
        markets.extend(
            self.settings
                .additional_markets
                .iter()
                .copied()
                .filter(|id| seen.insert(*id)),
        );
        markets
    }

    /// Candidates for `markets`, fetched in parallel chunks. Failing chunks
    /// are skipped.
    async fn fetch_candidates(&self, markets: &[B256]) -> Vec<LiquidationCandidate> {
        let chain_id = self.settings.chain_id;
        let chunks: Vec<&[B256]> = markets.chunks(self.settings.markets_per_request).collect();
        let responses = join_all(
            chunks
                .iter()
                .map(|chunk| self.source.liquidatable_positions(chain_id, chunk)),
        )
        .await;

        let mut all = LiquidatablePositions::default();
        for (chunk, response) in chunks.iter().zip(responses) {
            match response {
                Ok(positions) => all.extend(positions),
                Err(e) => error!(markets = chunk.len(), error = %e, "Failed to fetch liquidatable positions"),
            }
        }
        candidates(&all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U256};
    use anyhow::anyhow;
    use liquidator_api::{LiquidatablePosition, MarketParamsData, PositionData};
    use liquidator_chain::testing::{MockChain, MockSimulator, MockSubmitter};
    use liquidator_chain::{ConversionPipeline, Erc4626Venue, GasParams, Submitter};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    fn market(byte: u8) -> B256 {
        B256::repeat_byte(byte)
    }

    fn loan() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn vault_collateral() -> Address {
        Address::repeat_byte(0xbb)
    }

    fn position(market_id: B256, user: u8) -> LiquidatablePosition {
        LiquidatablePosition {
            position: PositionData {
                chain_id: 1,
                market_id,
                user: Address::repeat_byte(user),
                collateral: U256::from(1_000u64),
                borrow_shares: U256::from(1_000u64),
                supply_shares: U256::ZERO,
            },
            market_params: MarketParamsData {
                loan_token: loan(),
                collateral_token: vault_collateral(),
                irm: Address::ZERO,
                oracle: Address::repeat_byte(0xcc),
                lltv: U256::from(860_000_000_000_000_000u64),
            },
            seizable_collateral: U256::from(1_000u64),
            repayable_assets: U256::from(900u64),
        }
    }

    #[derive(Debug, Default)]
    struct MockSource {
        queues: HashMap<Address, Vec<B256>>,
        failing_vaults: HashSet<Address>,
        positions: HashMap<B256, Vec<LiquidatablePosition>>,
        requests: Mutex<Vec<Vec<B256>>>,
    }

    #[async_trait]
    impl PositionSource for MockSource {
        async fn withdraw_queue(&self, _chain_id: u64, vault: Address) -> Result<Vec<B256>> {
            if self.failing_vaults.contains(&vault) {
                return Err(anyhow!("indexer unavailable"));
            }
            Ok(self.queues.get(&vault).cloned().unwrap_or_default())
        }

        async fn liquidatable_positions(
            &self,
            _chain_id: u64,
            market_ids: &[B256],
        ) -> Result<LiquidatablePositions> {
            self.requests.lock().push(market_ids.to_vec());
            let mut result = LiquidatablePositions::default();
            for id in market_ids {
                if let Some(positions) = self.positions.get(id) {
                    result.liquidatable_positions.extend(positions.iter().cloned());
                }
            }
            Ok(result)
        }
    }

    fn settings(vaults: Vec<Address>, additional: Vec<B256>) -> ScannerSettings {
        ScannerSettings {
            chain_id: 1,
            vault_whitelist: vaults,
            additional_markets: additional,
            block_interval: 1,
            max_concurrent_positions: 4,
            markets_per_request: 2,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    /// Accepts transactions that are never mined.
    #[derive(Debug)]
    struct UnminedSubmitter;

    #[async_trait]
    impl Submitter for UnminedSubmitter {
        fn address(&self) -> Address {
            Address::repeat_byte(0x5e)
        }

        async fn gas_params(&self) -> Result<GasParams> {
            Ok(GasParams::Legacy {
                gas_price: 1_000_000_000,
            })
        }

        async fn submit(&self, _to: Address, _calldata: Bytes, _gas_limit: u64) -> Result<B256> {
            futures::future::pending().await
        }
    }

    fn liquidator(submitter: Arc<dyn Submitter>) -> Arc<Liquidator> {
        let chain = MockChain::new();
        chain.set_vault(vault_collateral(), loan());
        chain.set_preview_redeem(vault_collateral(), U256::from(1_000u64));
        Arc::new(
            Liquidator::new(
                1,
                Address::repeat_byte(0x99),
                Address::repeat_byte(0xee),
                Arc::new(chain),
                Arc::new(ConversionPipeline::new().with_venue(Erc4626Venue)),
                Arc::new(MockSimulator::succeeding(300_000, U256::from(50u64))),
                submitter,
            )
            .with_recompute_locally(false)
            .with_cooldown(Duration::from_secs(60)),
        )
    }

    fn submitter() -> Arc<MockSubmitter> {
        Arc::new(MockSubmitter::new(Address::repeat_byte(0x5e), 1_000_000_000))
    }

    #[tokio::test]
    async fn test_markets_merged_and_deduplicated() {
        let v1 = Address::repeat_byte(1);
        let v2 = Address::repeat_byte(2);
        let v3 = Address::repeat_byte(3);
        let source = MockSource {
            queues: HashMap::from([(v1, vec![market(1), market(2)]), (v2, vec![market(2), market(3)])]),
            failing_vaults: HashSet::from([v3]),
            ..Default::default()
        };
        let scanner = Scanner::new(
            settings(vec![v1, v3, v2], vec![market(3), market(4)]),
            Arc::new(source),
            liquidator(submitter()),
        );

        assert_eq!(
            scanner.resolve_markets().await,
            vec![market(1), market(2), market(3), market(4)]
        );
    }

    #[tokio::test]
    async fn test_pass_chunks_requests_and_executes() {
        let source = Arc::new(MockSource {
            positions: HashMap::from([
                (market(1), vec![position(market(1), 0x11)]),
                (market(3), vec![position(market(3), 0x12), position(market(3), 0x13)]),
            ]),
            ..Default::default()
        });
        let submitter = submitter();
        let scanner = Scanner::new(
            settings(vec![], vec![market(1), market(2), market(3)]),
            source.clone(),
            liquidator(submitter.clone()),
        );

        let report = scanner.run_pass().await.unwrap();
        assert_eq!(report.markets, 3);
        assert_eq!(report.candidates, 3);
        assert_eq!(report.count("executed"), 3);
        assert_eq!(report.errors, 0);
        assert_eq!(submitter.submissions().len(), 3);

        let requests = source.requests.lock().clone();
        assert_eq!(requests, vec![vec![market(1), market(2)], vec![market(3)]]);

        // Same positions on the next pass are cooling down.
        let report = scanner.run_pass().await.unwrap();
        assert_eq!(report.count("cooling_down"), 3);
        assert_eq!(submitter.submissions().len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let scanner = Scanner::new(
            settings(vec![], vec![market(1)]),
            Arc::new(MockSource::default()),
            liquidator(submitter()),
        );

        let guard = scanner.begin_pass().unwrap();
        assert!(scanner.run_pass().await.is_none());
        drop(guard);
        assert!(scanner.run_pass().await.is_some());
    }

    #[tokio::test]
    async fn test_attempt_errors_do_not_abort_pass() {
        // No decimals or route data for this collateral: conversion fails on a read.
        let mut broken = position(market(1), 0x21);
        broken.market_params.collateral_token = Address::repeat_byte(0xde);
        let source = MockSource {
            positions: HashMap::from([(market(1), vec![broken, position(market(1), 0x22)])]),
            ..Default::default()
        };
        let scanner = Scanner::new(
            settings(vec![], vec![market(1)]),
            Arc::new(source),
            liquidator(submitter()),
        );

        let report = scanner.run_pass().await.unwrap();
        assert_eq!(report.candidates, 2);
        assert_eq!(report.count("executed"), 1);
        assert_eq!(report.count("no_route") + report.errors, 1);
    }

    #[tokio::test]
    async fn test_unmined_submission_releases_pass() {
        let source = MockSource {
            positions: HashMap::from([(market(1), vec![position(market(1), 0x31)])]),
            ..Default::default()
        };
        let mut settings = settings(vec![], vec![market(1)]);
        settings.attempt_timeout = Duration::from_millis(50);
        let scanner = Scanner::new(settings, Arc::new(source), liquidator(Arc::new(UnminedSubmitter)));

        let report = scanner.run_pass().await.unwrap();
        assert_eq!(report.count("timed_out"), 1);

        // The next pass runs instead of being skipped as overlapping.
        let report = scanner.run_pass().await.unwrap();
        assert_eq!(report.count("cooling_down"), 1);
    }

    #[tokio::test]
    async fn test_block_interval_counts_observed_blocks() {
        let source = Arc::new(MockSource::default());
        let mut settings = settings(vec![], vec![market(1)]);
        settings.block_interval = 2;
        let scanner = Arc::new(Scanner::new(settings, source.clone(), liquidator(submitter())));

        // Polling skipped heights 102, 104 and 106.
        let blocks = stream::iter([100u64, 101, 103, 105, 107]).then(|block| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            block
        });
        scanner.run(Box::pin(blocks)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Passes on the 1st, 3rd and 5th observed blocks.
        assert_eq!(source.requests.lock().len(), 3);
    }

    #[test]
    fn test_settings_from_config() {
        let settings = ScannerSettings::new(&ChainConfig::mainnet(), &BotConfig::testing());
        assert_eq!(settings.chain_id, 1);
        assert_eq!(settings.vault_whitelist.len(), 2);
        assert_eq!(settings.additional_markets.len(), 1);
        assert_eq!(settings.max_concurrent_positions, 2);
        assert_eq!(settings.attempt_timeout, Duration::from_secs(60));
    }
}
