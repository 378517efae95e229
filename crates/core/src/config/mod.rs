//! Deployment configuration.
//!
//! This module provides:
//! - The on-disk TOML schema of a deployment file
//! - Environment variable expansion for `${VAR}` references
//! - Resolution into an immutable, validated [`Deployment`]

mod chain;
mod deployment;
mod loader;

pub use chain::{ChainSection, GasPricingModel, GasSection};
pub use deployment::{
    AccountEntry, ContractsSection, DeploymentFile, DeploymentSection, PoolEntry,
    RewardSourceEntry, SweepSection,
};
pub use loader::{
    Account, ChainSettings, Contracts, Deployment, DeploymentLoader, Pool, RewardSource,
    SweepSettings,
};

#[cfg(test)]
pub(crate) use loader::tests::sample_toml;
