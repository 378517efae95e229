//! Constant-product DEX and staking-pool interfaces.
//!
//! Katana (Ronin) is a Uniswap V2 fork whose router names its native-currency
//! entry points after RON; the Uniswap V2 router uses ETH. Both take the same
//! arguments, so the encoder picks the function by [`RouterFlavor`].

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};

sol! {
    /// Constant-product pair (Uniswap V2 / Katana LP token)
    #[sol(rpc)]
    interface IPair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves() external view returns (
            uint112 _reserve0,
            uint112 _reserve1,
            uint32 _blockTimestampLast
        );
    }
}

sol! {
    /// Katana router native-currency entry points
    interface IKatanaRouter {
        function swapExactRONForTokens(
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external payable returns (uint256[] memory amounts);

        function addLiquidityRON(
            address token,
            uint256 amountTokenDesired,
            uint256 amountTokenMin,
            uint256 amountRONMin,
            address to,
            uint256 deadline
        ) external payable returns (uint256 amountToken, uint256 amountRON, uint256 liquidity);
    }
}

sol! {
    /// Uniswap V2 router native-currency entry points
    interface IUniswapV2Router {
        function swapExactETHForTokens(
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external payable returns (uint256[] memory amounts);

        function addLiquidityETH(
            address token,
            uint256 amountTokenDesired,
            uint256 amountTokenMin,
            uint256 amountETHMin,
            address to,
            uint256 deadline
        ) external payable returns (uint256 amountToken, uint256 amountETH, uint256 liquidity);
    }
}

sol! {
    /// Reward staking pool (AXS staking, land staking, LP farms)
    #[sol(rpc)]
    interface IStakingPool {
        function getPendingRewards(address user) external view returns (uint256);
        function getStakingAmount(address user) external view returns (uint256);
        function claimPendingRewards() external;
        function restakeRewards() external;
        function stake(uint256 amount) external;
    }
}

/// Which router ABI to encode against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterFlavor {
    #[default]
    Katana,
    UniswapV2,
}

impl RouterFlavor {
    /// Encode "swap exact native for tokens".
    pub fn encode_swap_exact_native(
        &self,
        amount_out_min: U256,
        path: Vec<Address>,
        to: Address,
        deadline: U256,
    ) -> (Bytes, &'static str) {
        match self {
            Self::Katana => {
                let call = IKatanaRouter::swapExactRONForTokensCall {
                    amountOutMin: amount_out_min,
                    path,
                    to,
                    deadline,
                };
                (call.abi_encode().into(), IKatanaRouter::swapExactRONForTokensCall::SIGNATURE)
            }
            Self::UniswapV2 => {
                let call = IUniswapV2Router::swapExactETHForTokensCall {
                    amountOutMin: amount_out_min,
                    path,
                    to,
                    deadline,
                };
                (call.abi_encode().into(), IUniswapV2Router::swapExactETHForTokensCall::SIGNATURE)
            }
        }
    }

    /// Encode "add liquidity paired with native currency".
    #[allow(clippy::too_many_arguments)]
    pub fn encode_add_liquidity_native(
        &self,
        token: Address,
        amount_token_desired: U256,
        amount_token_min: U256,
        amount_native_min: U256,
        to: Address,
        deadline: U256,
    ) -> (Bytes, &'static str) {
        match self {
            Self::Katana => {
                let call = IKatanaRouter::addLiquidityRONCall {
                    token,
                    amountTokenDesired: amount_token_desired,
                    amountTokenMin: amount_token_min,
                    amountRONMin: amount_native_min,
                    to,
                    deadline,
                };
                (call.abi_encode().into(), IKatanaRouter::addLiquidityRONCall::SIGNATURE)
            }
            Self::UniswapV2 => {
                let call = IUniswapV2Router::addLiquidityETHCall {
                    token,
                    amountTokenDesired: amount_token_desired,
                    amountTokenMin: amount_token_min,
                    amountETHMin: amount_native_min,
                    to,
                    deadline,
                };
                (call.abi_encode().into(), IUniswapV2Router::addLiquidityETHCall::SIGNATURE)
            }
        }
    }
}
