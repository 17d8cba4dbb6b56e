//! Contract bindings for Morpho Blue liquidations.
//!
//! Interfaces are declared with `sol!` so calls can be ABI-encoded for the
//! executor batch and issued as typed `eth_call`s through a provider.

use alloy::primitives::{keccak256, B256};
use alloy::sol;
use alloy::sol_types::SolValue;

sol! {
    /// Market parameters as stored by Morpho Blue (the id preimage).
    #[derive(Debug, Default, PartialEq, Eq)]
    struct MarketParams {
        address loanToken;
        address collateralToken;
        address oracle;
        address irm;
        uint256 lltv;
    }

    /// Morpho Blue singleton (subset used by the bot).
    #[sol(rpc)]
    interface IMorpho {
        function market(bytes32 id)
            external
            view
            returns (
                uint128 totalSupplyAssets,
                uint128 totalSupplyShares,
                uint128 totalBorrowAssets,
                uint128 totalBorrowShares,
                uint128 lastUpdate,
                uint128 fee
            );

        function position(bytes32 id, address user)
            external
            view
            returns (uint256 supplyShares, uint128 borrowShares, uint128 collateral);

        function isAuthorized(address authorizer, address authorized) external view returns (bool);

        function liquidate(
            MarketParams memory marketParams,
            address borrower,
            uint256 seizedAssets,
            uint256 repaidShares,
            bytes memory data
        ) external returns (uint256, uint256);
    }

    /// Pre-liquidation contract deployed per (market, parameter set).
    interface IPreLiquidation {
        function preLiquidate(
            address borrower,
            uint256 seizedAssets,
            uint256 repaidShares,
            bytes calldata data
        ) external returns (uint256, uint256);
    }

    /// AdaptiveCurveIrm stored state.
    #[sol(rpc)]
    interface IAdaptiveCurveIrm {
        function rateAtTarget(bytes32 id) external view returns (int256);
    }

    /// Morpho oracle: price of 1 collateral unit in loan units, scaled by 1e36.
    #[sol(rpc)]
    interface IOracle {
        function price() external view returns (uint256);
    }

    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }

    #[sol(rpc)]
    interface IERC4626 {
        function asset() external view returns (address);
        function previewRedeem(uint256 shares) external view returns (uint256);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256);
    }

    /// OpenZeppelin ERC20Wrapper.
    interface IERC20Wrapper {
        function withdrawTo(address account, uint256 value) external returns (bool);
    }

    #[sol(rpc)]
    interface IUniswapV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }

    #[sol(rpc)]
    interface IUniswapV3Pool {
        function liquidity() external view returns (uint128);
    }

    /// Uniswap V3 SwapRouter (v1, with deadline).
    interface ISwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params)
            external
            payable
            returns (uint256 amountOut);
    }
}

impl MarketParams {
    /// Market id: `keccak256(abi.encode(marketParams))`.
    pub fn id(&self) -> B256 {
        keccak256(self.abi_encode())
    }
}
