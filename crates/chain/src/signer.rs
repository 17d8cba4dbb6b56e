//! Signing and submission of executor transactions.
//!
//! Nonces are tracked locally so concurrent liquidations on one chain never
//! race on `eth_getTransactionCount`. Gas limits come from the simulation.

use crate::gas::{GasConfig, GasParams, GasStrategy};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Local nonce counter, resynced from the chain after a failure.
#[derive(Debug)]
pub struct NonceManager {
    next: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            next: AtomicU64::new(initial_nonce),
        }
    }

    /// Reserve the next nonce.
    #[inline]
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Overwrite with the chain's pending count.
    pub fn reset(&self, chain_nonce: u64) {
        self.next.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Transaction submission seam used by the execution guard.
#[async_trait]
pub trait Submitter: Send + Sync + Debug {
    /// Account sending the transactions.
    fn address(&self) -> Address;

    /// Current gas prices, used both for the profit check and the transaction.
    async fn gas_params(&self) -> Result<GasParams>;

    /// Send `calldata` to `to`, wait for the receipt, and fail on revert.
    async fn submit(&self, to: Address, calldata: Bytes, gas_limit: u64) -> Result<B256>;
}

pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
    nonce_manager: NonceManager,
    gas_strategy: Box<dyn GasStrategy>,
    receipt_timeout: Duration,
}

pub struct TransactionSenderBuilder {
    rpc_url: String,
    chain_id: u64,
    gas_strategy: Option<Box<dyn GasStrategy>>,
    receipt_timeout: Duration,
}

const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

impl TransactionSenderBuilder {
    pub fn new(rpc_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            gas_strategy: None,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn gas_strategy(mut self, strategy: Box<dyn GasStrategy>) -> Self {
        self.gas_strategy = Some(strategy);
        self
    }

    pub fn gas_config(mut self, config: &GasConfig) -> Self {
        self.gas_strategy = Some(config.strategy());
        self
    }

    /// Give up on a receipt after `timeout`; the attempt then counts as failed.
    pub fn receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Parse the key and fetch the starting nonce.
    pub async fn build(self, private_key: &str) -> Result<TransactionSender> {
        let signer: PrivateKeySigner = private_key.trim_start_matches("0x").parse()?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let initial_nonce = provider.get_transaction_count(address).await?;

        let gas_strategy = self
            .gas_strategy
            .unwrap_or_else(|| GasConfig::default().strategy());

        info!(
            address = %address,
            chain_id = self.chain_id,
            initial_nonce,
            gas_strategy = gas_strategy.strategy_name(),
            receipt_timeout_secs = self.receipt_timeout.as_secs(),
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            rpc_url: self.rpc_url,
            wallet,
            address,
            chain_id: self.chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            gas_strategy,
            receipt_timeout: self.receipt_timeout,
        })
    }
}

impl TransactionSender {
    pub fn gas_strategy_name(&self) -> &'static str {
        self.gas_strategy.strategy_name()
    }

    pub fn receipt_timeout(&self) -> Duration {
        self.receipt_timeout
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce_manager.current()
    }

    /// Resync the local nonce from the chain.
    pub async fn sync_nonce(&self) {
        let provider = match self.rpc_url.parse() {
            Ok(url) => ProviderBuilder::new().on_http(url),
            Err(e) => {
                warn!(error = %e, "Invalid RPC URL, nonce not synced");
                return;
            }
        };
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => warn!(error = %e, "Failed to sync nonce from chain"),
        }
    }
}

#[async_trait]
impl Submitter for TransactionSender {
    fn address(&self) -> Address {
        self.address
    }

    async fn gas_params(&self) -> Result<GasParams> {
        self.gas_strategy.fetch_params(&self.rpc_url).await
    }

    async fn submit(&self, to: Address, calldata: Bytes, gas_limit: u64) -> Result<B256> {
        let start = Instant::now();
        let gas_params = self.gas_params().await?;
        let nonce = self.nonce_manager.next();

        let mut tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata)
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_chain_id(self.chain_id);
        self.gas_strategy.apply_gas(&mut tx, &gas_params);

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let pending = match provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                self.sync_nonce().await;
                return Err(e.into());
            }
        };
        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, nonce, gas_limit, "Transaction submitted");

        let receipt = match pending
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(tx_hash = %tx_hash, error = %e, "No receipt for transaction");
                self.sync_nonce().await;
                bail!("Receipt unavailable for {tx_hash}: {e}");
            }
        };
        if !receipt.status() {
            warn!(tx_hash = %tx_hash, "Transaction reverted on-chain");
            self.sync_nonce().await;
            bail!("Transaction reverted: {tx_hash}");
        }

        info!(
            tx_hash = %tx_hash,
            block = receipt.block_number.unwrap_or_default(),
            gas_used = receipt.gas_used,
            total_ms = start.elapsed().as_millis(),
            "Transaction confirmed"
        );
        Ok(tx_hash)
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("gas_strategy", &self.gas_strategy.strategy_name())
            .finish_non_exhaustive()
    }
}
