//! On-disk schema of a deployment file.
//!
//! One TOML file describes one environment: chain, contracts, the account
//! registry, reward sources, configured pools and sweep parameters.

use super::chain::ChainSection;
use farmer_chain::RouterFlavor;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full deployment file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentFile {
    pub deployment: DeploymentSection,
    pub chain: ChainSection,
    pub contracts: ContractsSection,
    pub accounts: Vec<AccountEntry>,
    #[serde(default)]
    pub reward_sources: Vec<RewardSourceEntry>,
    pub pools: Vec<PoolEntry>,
    pub sweep: SweepSection,
}

/// `[deployment]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSection {
    /// Deployment name (e.g., "ronin")
    pub name: String,
    /// Symbol all valuations are expressed in (e.g., "USDC")
    pub reference_symbol: String,
    /// Native balance the primary account never spends below
    #[serde(default = "default_native_floor")]
    pub native_floor: String,
    /// Native balance secondary accounts are topped up to
    #[serde(default = "default_topup_target")]
    pub topup_target: String,
}

fn default_native_floor() -> String {
    "500".to_string()
}

fn default_topup_target() -> String {
    "1.0".to_string()
}

/// `[contracts]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsSection {
    /// AMM router
    pub router: String,
    /// Router call encoding
    #[serde(default)]
    pub router_flavor: RouterFlavor,
    /// Wrapped native token
    pub hub_token: String,
    /// Token paid out by reward sources and restaked
    pub reward_token: String,
    /// Staking contract for the reward token
    pub reward_staking: String,
}

/// `[[accounts]]` entry.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub role: String,
    /// Private key, normally a `${VAR}` reference
    pub private_key: String,
    #[serde(default)]
    pub primary: bool,
}

impl std::fmt::Debug for AccountEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountEntry")
            .field("role", &self.role)
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}

/// `[[reward_sources]]` entry: a staking contract every listed account claims from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSourceEntry {
    pub name: String,
    pub staking: String,
    /// Roles that claim here; empty means every account
    #[serde(default)]
    pub accounts: Vec<String>,
}

/// `[[pools]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    /// Display name (e.g., "RON/WETH")
    pub name: String,
    /// Pair contract
    pub pair: String,
    /// LP staking contract, if the LP token is farmed
    #[serde(default)]
    pub staking: Option<String>,
}

/// `[sweep]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSection {
    /// Pool the sweep sells into and deposits to
    pub liquidity_pool: String,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    /// Seconds added to the pair timestamp for swap/deposit deadlines
    #[serde(default = "default_deadline_window")]
    pub deadline_window_secs: u64,
    /// Pool swap fee
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u16,
}

fn default_slippage_bps() -> u16 {
    200
}

fn default_deadline_window() -> u64 {
    1000
}

fn default_fee_bps() -> u16 {
    30
}

impl DeploymentFile {
    /// Load a deployment file from TOML.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
