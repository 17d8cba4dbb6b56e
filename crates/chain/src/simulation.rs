//! Atomic dry-run of an executor batch.
//!
//! The batch is bracketed by two `balanceOf(executor)` reads of the loan
//! token inside a single `eth_simulateV1` block, so the balance delta is what
//! the liquidation would actually earn against current state.

use alloy::primitives::{Address, Bytes, U256, U64};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol_types::SolCall;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::debug;

use crate::contracts::IERC20;

/// What to simulate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    /// Sender of the executor transaction.
    pub from: Address,
    pub executor: Address,
    /// `exec(Call[])` calldata.
    pub calldata: Bytes,
    /// Token whose executor balance is measured.
    pub loan_token: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub success: bool,
    pub gas_used: u64,
    pub balance_before: U256,
    pub balance_after: U256,
    pub revert_reason: Option<String>,
}

impl SimulationOutcome {
    pub fn reverted(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            gas_used: 0,
            balance_before: U256::ZERO,
            balance_after: U256::ZERO,
            revert_reason: Some(reason.into()),
        }
    }

    /// Loan tokens gained by the executor; zero if the balance shrank.
    pub fn balance_delta(&self) -> U256 {
        self.balance_after.saturating_sub(self.balance_before)
    }
}

#[async_trait]
pub trait BundleSimulator: Send + Sync + Debug {
    async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationOutcome>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimCall {
    from: Address,
    to: Address,
    data: Bytes,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimBlock {
    calls: Vec<SimCall>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimPayload {
    block_state_calls: Vec<SimBlock>,
    validation: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedBlock {
    calls: Vec<SimulatedCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedCall {
    #[serde(default)]
    return_data: Bytes,
    gas_used: U64,
    status: U64,
    #[serde(default)]
    error: Option<SimulatedCallError>,
}

#[derive(Debug, Deserialize)]
struct SimulatedCallError {
    message: String,
}

/// `eth_simulateV1` against the latest block.
#[derive(Debug, Clone)]
pub struct RpcSimulator {
    rpc_url: String,
}

impl RpcSimulator {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
        }
    }

    fn payload(request: &SimulationRequest) -> SimPayload {
        let balance_of = Bytes::from(
            IERC20::balanceOfCall {
                account: request.executor,
            }
            .abi_encode(),
        );
        let read = |data: Bytes| SimCall {
            from: request.from,
            to: request.loan_token,
            data,
        };

        SimPayload {
            block_state_calls: vec![SimBlock {
                calls: vec![
                    read(balance_of.clone()),
                    SimCall {
                        from: request.from,
                        to: request.executor,
                        data: request.calldata.clone(),
                    },
                    read(balance_of),
                ],
            }],
            validation: false,
        }
    }

    fn decode_balance(call: &SimulatedCall) -> Result<U256> {
        let decoded = IERC20::balanceOfCall::abi_decode_returns(&call.return_data, true)
            .context("Malformed balanceOf return data")?;
        Ok(decoded._0)
    }

    fn interpret(blocks: Vec<SimulatedBlock>) -> Result<SimulationOutcome> {
        let block = blocks
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("eth_simulateV1 returned no blocks"))?;
        let [before, exec, after]: [SimulatedCall; 3] = block
            .calls
            .try_into()
            .map_err(|calls: Vec<_>| anyhow!("Expected 3 simulated calls, got {}", calls.len()))?;

        if exec.status.is_zero() {
            let reason = exec
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "execution reverted".to_string());
            return Ok(SimulationOutcome {
                gas_used: exec.gas_used.to::<u64>(),
                ..SimulationOutcome::reverted(reason)
            });
        }

        Ok(SimulationOutcome {
            success: true,
            gas_used: exec.gas_used.to::<u64>(),
            balance_before: Self::decode_balance(&before)?,
            balance_after: Self::decode_balance(&after)?,
            revert_reason: None,
        })
    }
}

#[async_trait]
impl BundleSimulator for RpcSimulator {
    async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationOutcome> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let blocks: Vec<SimulatedBlock> = provider
            .raw_request("eth_simulateV1".into(), (Self::payload(request), "latest"))
            .await
            .context("eth_simulateV1 failed")?;

        let outcome = Self::interpret(blocks)?;
        debug!(
            executor = %request.executor,
            success = outcome.success,
            gas_used = outcome.gas_used,
            delta = %outcome.balance_delta(),
            "Bundle simulated"
        );
        Ok(outcome)
    }
}
