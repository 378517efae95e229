//! Contract bindings used by the farmer.
//!
//! - [`IERC20`]: reward tokens, paired assets, LP token balances/approvals
//! - [`IPair`]: constant-product pair reads (tokens, reserves)
//! - [`IStakingPool`]: reward staking and LP farm contracts
//! - Router encoders for Katana and Uniswap V2 via [`RouterFlavor`]

mod common;
mod dex;

pub use common::IERC20;
pub use dex::{IKatanaRouter, IPair, IStakingPool, IUniswapV2Router, RouterFlavor};
