//! In-memory implementations of the chain seams for tests.

use alloy::primitives::{Address, Bytes, B256, I256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::gas::GasParams;
use crate::reader::{ChainReader, MarketStateRaw, PositionRaw};
use crate::signer::Submitter;
use crate::simulation::{BundleSimulator, SimulationOutcome, SimulationRequest};

#[derive(Debug, Default)]
struct ChainState {
    timestamp: u64,
    prices: HashMap<Address, U256>,
    markets: HashMap<B256, MarketStateRaw>,
    positions: HashMap<(B256, Address), PositionRaw>,
    authorizations: HashMap<(Address, Address), bool>,
    rates_at_target: HashMap<B256, I256>,
    decimals: HashMap<Address, u8>,
    vaults: HashMap<Address, Address>,
    previews: HashMap<Address, U256>,
    pools: HashMap<(Address, Address, Address, u32), Address>,
    liquidity: HashMap<Address, u128>,
}

/// Programmable [`ChainReader`]. Missing entries read as errors, except pools
/// (zero address), authorizations (false) and vault assets (`None`), mirroring
/// on-chain defaults.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    asset_calls: AtomicUsize,
    failing_asset_reads: AtomicUsize,
    get_pool_calls: AtomicUsize,
}

fn sorted(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.state.lock().timestamp = timestamp;
    }

    pub fn set_price(&self, oracle: Address, price: U256) {
        self.state.lock().prices.insert(oracle, price);
    }

    pub fn set_market(&self, id: B256, market: MarketStateRaw) {
        self.state.lock().markets.insert(id, market);
    }

    pub fn set_position(&self, id: B256, user: Address, position: PositionRaw) {
        self.state.lock().positions.insert((id, user), position);
    }

    pub fn set_authorized(&self, authorizer: Address, authorized: Address, value: bool) {
        self.state
            .lock()
            .authorizations
            .insert((authorizer, authorized), value);
    }

    pub fn set_rate_at_target(&self, id: B256, rate: I256) {
        self.state.lock().rates_at_target.insert(id, rate);
    }

    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.state.lock().decimals.insert(token, decimals);
    }

    pub fn set_vault(&self, vault: Address, asset: Address) {
        self.state.lock().vaults.insert(vault, asset);
    }

    pub fn set_preview_redeem(&self, vault: Address, assets: U256) {
        self.state.lock().previews.insert(vault, assets);
    }

    pub fn set_uniswap_pool(&self, factory: Address, a: Address, b: Address, fee: u32, pool: Address) {
        let (a, b) = sorted(a, b);
        self.state.lock().pools.insert((factory, a, b, fee), pool);
    }

    pub fn set_uniswap_liquidity(&self, pool: Address, liquidity: u128) {
        self.state.lock().liquidity.insert(pool, liquidity);
    }

    /// Fail the next `count` `asset()` reads as transport errors.
    pub fn fail_asset_reads(&self, count: usize) {
        self.failing_asset_reads.store(count, Ordering::SeqCst);
    }

    /// Number of `asset()` reads served.
    pub fn asset_calls(&self) -> usize {
        self.asset_calls.load(Ordering::SeqCst)
    }

    /// Number of factory `getPool` reads served.
    pub fn get_pool_calls(&self) -> usize {
        self.get_pool_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn block_timestamp(&self) -> Result<u64> {
        Ok(self.state.lock().timestamp)
    }

    async fn oracle_price(&self, oracle: Address) -> Result<U256> {
        self.state
            .lock()
            .prices
            .get(&oracle)
            .copied()
            .ok_or_else(|| anyhow!("no price for oracle {oracle}"))
    }

    async fn morpho_market(&self, _morpho: Address, id: B256) -> Result<MarketStateRaw> {
        self.state
            .lock()
            .markets
            .get(&id)
            .copied()
            .ok_or_else(|| anyhow!("unknown market {id}"))
    }

    async fn morpho_position(&self, _morpho: Address, id: B256, user: Address) -> Result<PositionRaw> {
        Ok(self
            .state
            .lock()
            .positions
            .get(&(id, user))
            .copied()
            .unwrap_or_default())
    }

    async fn morpho_is_authorized(
        &self,
        _morpho: Address,
        authorizer: Address,
        authorized: Address,
    ) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .authorizations
            .get(&(authorizer, authorized))
            .copied()
            .unwrap_or(false))
    }

    async fn irm_rate_at_target(&self, _irm: Address, id: B256) -> Result<I256> {
        Ok(self
            .state
            .lock()
            .rates_at_target
            .get(&id)
            .copied()
            .unwrap_or(I256::ZERO))
    }

    async fn erc20_decimals(&self, token: Address) -> Result<u8> {
        self.state
            .lock()
            .decimals
            .get(&token)
            .copied()
            .ok_or_else(|| anyhow!("no decimals for {token}"))
    }

    async fn erc4626_asset(&self, vault: Address) -> Result<Option<Address>> {
        self.asset_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_asset_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("connection reset by peer"));
        }
        Ok(self.state.lock().vaults.get(&vault).copied())
    }

    async fn erc4626_preview_redeem(&self, vault: Address, _shares: U256) -> Result<U256> {
        self.state
            .lock()
            .previews
            .get(&vault)
            .copied()
            .ok_or_else(|| anyhow!("execution reverted"))
    }

    async fn uniswap_v3_pool(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
        fee: u32,
    ) -> Result<Address> {
        self.get_pool_calls.fetch_add(1, Ordering::SeqCst);
        let (a, b) = sorted(token_a, token_b);
        Ok(self
            .state
            .lock()
            .pools
            .get(&(factory, a, b, fee))
            .copied()
            .unwrap_or(Address::ZERO))
    }

    async fn uniswap_v3_liquidity(&self, pool: Address) -> Result<u128> {
        self.state
            .lock()
            .liquidity
            .get(&pool)
            .copied()
            .ok_or_else(|| anyhow!("no liquidity for {pool}"))
    }
}

/// Returns a fixed outcome and records every request.
#[derive(Debug)]
pub struct MockSimulator {
    outcome: Mutex<SimulationOutcome>,
    requests: Mutex<Vec<SimulationRequest>>,
}

impl MockSimulator {
    pub fn new(outcome: SimulationOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Successful run gaining `delta` loan tokens.
    pub fn succeeding(gas_used: u64, delta: U256) -> Self {
        Self::new(SimulationOutcome {
            success: true,
            gas_used,
            balance_before: U256::ZERO,
            balance_after: delta,
            revert_reason: None,
        })
    }

    pub fn reverting(reason: &str) -> Self {
        Self::new(SimulationOutcome::reverted(reason))
    }

    pub fn set_outcome(&self, outcome: SimulationOutcome) {
        *self.outcome.lock() = outcome;
    }

    pub fn requests(&self) -> Vec<SimulationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl BundleSimulator for MockSimulator {
    async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationOutcome> {
        self.requests.lock().push(request.clone());
        Ok(self.outcome.lock().clone())
    }
}

/// A submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub to: Address,
    pub calldata: Bytes,
    pub gas_limit: u64,
}

/// Records submissions; optionally fails them.
#[derive(Debug)]
pub struct MockSubmitter {
    address: Address,
    gas_price: u128,
    fail: bool,
    submissions: Mutex<Vec<Submission>>,
}

impl MockSubmitter {
    pub fn new(address: Address, gas_price: u128) -> Self {
        Self {
            address,
            gas_price,
            fail: false,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Every submission reverts.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl Submitter for MockSubmitter {
    fn address(&self) -> Address {
        self.address
    }

    async fn gas_params(&self) -> Result<GasParams> {
        Ok(GasParams::Legacy {
            gas_price: self.gas_price,
        })
    }

    async fn submit(&self, to: Address, calldata: Bytes, gas_limit: u64) -> Result<B256> {
        let mut submissions = self.submissions.lock();
        submissions.push(Submission {
            to,
            calldata,
            gas_limit,
        });
        if self.fail {
            return Err(anyhow!("Transaction reverted"));
        }
        Ok(B256::with_last_byte(submissions.len() as u8))
    }
}
