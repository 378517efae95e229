//! Yield farming core logic.
//!
//! This crate provides the maintenance bot functionality:
//! - Deployment configuration loading and validation
//! - Price graph built from pair reserves, with hub-token price resolution
//! - Balance, staking and LP position aggregation
//! - Slippage-bounded, gas-safe swap and liquidity execution
//! - Reward sweep orchestration
//!
//! All chain access goes through the [`farmer_chain::ChainAccess`] port.

pub mod amm;
pub mod config;
mod error;
mod executor;
mod positions;
pub mod price;
mod sweep;
pub mod units;

#[cfg(test)]
mod test_support;

pub use config::{
    Account, ChainSettings, Contracts, Deployment, DeploymentLoader, Pool, RewardSource,
    SweepSettings,
};
pub use error::{FarmError, FarmResult};
pub use executor::{
    sell_amount, Confirmed, DepositOutcome, DepositPlan, Executor, ExecutorSettings, PairState,
    SwapOutcome, SwapPlan, GAS_LIMIT_MULTIPLIER,
};
pub use positions::{
    AccountAmount, Amount, LpPosition, OwnedToken, PendingReward, PendingSummary, PortfolioLine,
    PortfolioReport, PositionReader, PriceRow, PriceTable,
};
pub use price::{PoolSnapshot, PriceEdge, PriceGraph, PriceResolver};
pub use sweep::{
    StepReport, SweepEvent, SweepObserver, SweepReport, SweepStep, Sweeper, TracingObserver,
};
