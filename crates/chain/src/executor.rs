//! Call-batch encoder for the liquidation executor contract.
//!
//! The executor runs `exec(Call[])` sequentially. Conversion calls cannot sit
//! in the top-level batch: Morpho transfers the seized collateral before the
//! liquidation callback and pulls the repaid loan assets after it returns, so
//! the swaps must run inside the callback.
//!
//! ```text
//! exec([
//!     approve(loanToken, morpho | preLiquidation, max),
//!     liquidate | preLiquidate(borrower, seized, 0, abi.encode(Call[] conversions)),
//! ])
//! ```

use alloy::primitives::{aliases::U24, Address, Bytes, U160, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};

use crate::contracts::{
    IERC20, IERC20Wrapper, IERC4626, IMorpho, IPreLiquidation, ISwapRouter, MarketParams,
};

sol! {
    /// One step executed by the executor contract.
    #[derive(Debug, PartialEq, Eq)]
    struct Call {
        address target;
        uint256 value;
        bytes callData;
    }

    interface IExecutor {
        function exec(Call[] calldata calls) external payable;
    }
}

impl Call {
    fn new(target: Address, call_data: Vec<u8>) -> Self {
        Self {
            target,
            value: U256::ZERO,
            callData: Bytes::from(call_data),
        }
    }
}

/// Accumulates calls for one executor transaction.
///
/// Venues push their conversion calls here; [`ExecutorEncoder::flush`] drains
/// them so they can be nested inside the liquidation callback.
#[derive(Debug, Clone)]
pub struct ExecutorEncoder {
    executor: Address,
    calls: Vec<Call>,
}

impl ExecutorEncoder {
    pub fn new(executor: Address) -> Self {
        Self {
            executor,
            calls: Vec::new(),
        }
    }

    /// Executor contract address (recipient of every conversion).
    pub fn address(&self) -> Address {
        self.executor
    }

    pub fn push(&mut self, call: Call) -> &mut Self {
        self.calls.push(call);
        self
    }

    pub fn erc20_approve(&mut self, token: Address, spender: Address, amount: U256) -> &mut Self {
        let data = IERC20::approveCall { spender, amount }.abi_encode();
        self.push(Call::new(token, data))
    }

    /// Redeem vault shares into the executor.
    pub fn erc4626_redeem(&mut self, vault: Address, shares: U256) -> &mut Self {
        let data = IERC4626::redeemCall {
            shares,
            receiver: self.executor,
            owner: self.executor,
        }
        .abi_encode();
        self.push(Call::new(vault, data))
    }

    pub fn erc20_wrapper_withdraw_to(&mut self, wrapper: Address, amount: U256) -> &mut Self {
        let data = IERC20Wrapper::withdrawToCall {
            account: self.executor,
            value: amount,
        }
        .abi_encode();
        self.push(Call::new(wrapper, data))
    }

    /// Single-pool exact-input swap with no slippage bound; the simulation
    /// balance delta is the real guard.
    pub fn uniswap_v3_exact_input_single(
        &mut self,
        router: Address,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
    ) -> &mut Self {
        let params = ISwapRouter::ExactInputSingleParams {
            tokenIn: token_in,
            tokenOut: token_out,
            fee: U24::from(fee),
            recipient: self.executor,
            deadline: U256::MAX,
            amountIn: amount_in,
            amountOutMinimum: U256::ZERO,
            sqrtPriceLimitX96: U160::ZERO,
        };
        let data = ISwapRouter::exactInputSingleCall { params }.abi_encode();
        self.push(Call::new(router, data))
    }

    pub fn morpho_blue_liquidate(
        &mut self,
        morpho: Address,
        params: &MarketParams,
        borrower: Address,
        seized_assets: U256,
        repaid_shares: U256,
        callbacks: Vec<Call>,
    ) -> &mut Self {
        let data = IMorpho::liquidateCall {
            marketParams: params.clone(),
            borrower,
            seizedAssets: seized_assets,
            repaidShares: repaid_shares,
            data: encode_callbacks(callbacks),
        }
        .abi_encode();
        self.push(Call::new(morpho, data))
    }

    pub fn pre_liquidate(
        &mut self,
        pre_liquidation: Address,
        borrower: Address,
        seized_assets: U256,
        repaid_shares: U256,
        callbacks: Vec<Call>,
    ) -> &mut Self {
        let data = IPreLiquidation::preLiquidateCall {
            borrower,
            seizedAssets: seized_assets,
            repaidShares: repaid_shares,
            data: encode_callbacks(callbacks),
        }
        .abi_encode();
        self.push(Call::new(pre_liquidation, data))
    }

    /// Take the accumulated calls, leaving the encoder empty.
    pub fn flush(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    /// Encode `exec(calls)` calldata.
    pub fn build(&self) -> Bytes {
        let call = IExecutor::execCall {
            calls: self.calls.clone(),
        };
        Bytes::from(call.abi_encode())
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Callback payload decoded by the executor's `onMorphoLiquidate` / `onPreLiquidate`.
pub fn encode_callbacks(calls: Vec<Call>) -> Bytes {
    if calls.is_empty() {
        return Bytes::new();
    }
    Bytes::from(calls.abi_encode())
}
