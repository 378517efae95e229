//! Deployment loader: reads a deployment file, expands environment
//! references and resolves it into an immutable, validated [`Deployment`].

use super::chain::{expand_env_required, ChainSection};
use super::deployment::{DeploymentFile, PoolEntry};
use crate::error::{FarmError, FarmResult};
use crate::units::parse_amount;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use farmer_chain::{AccountRole, AccountSigners, ChainResult, GasPricing, RouterFlavor};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Native currency precision.
const NATIVE_DECIMALS: u8 = 18;

/// Fully resolved deployment configuration.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Deployment name
    pub name: String,
    /// Symbol valuations are expressed in
    pub reference_symbol: String,
    /// Minimum native balance kept on the primary account (raw units)
    pub native_floor: U256,
    /// Native balance secondary accounts are topped up to (raw units)
    pub topup_target: U256,
    /// Chain settings
    pub chain: ChainSettings,
    /// Contract addresses
    pub contracts: Contracts,
    /// Account registry, in configuration order
    accounts: Vec<Account>,
    /// Per-account claimable staking contracts
    pub reward_sources: Vec<RewardSource>,
    /// Configured pools
    pub pools: Vec<Pool>,
    /// Sweep parameters
    pub sweep: SweepSettings,
    /// Index of the primary account in `accounts`
    primary: usize,
}

/// Resolved chain settings.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub chain_id: u64,
    pub name: String,
    pub native_symbol: String,
    pub hub_symbol: String,
    pub rpc_url: String,
    pub block_time: Duration,
    pub gas: GasPricing,
}

/// Resolved contract addresses.
#[derive(Debug, Clone)]
pub struct Contracts {
    pub router: Address,
    pub router_flavor: RouterFlavor,
    pub hub_token: Address,
    pub reward_token: Address,
    pub reward_staking: Address,
}

/// An account role bound to a signing key.
#[derive(Clone)]
pub struct Account {
    pub role: AccountRole,
    key: String,
    pub primary: bool,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("role", &self.role)
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}

/// A staking contract claimed from by a set of accounts.
#[derive(Debug, Clone)]
pub struct RewardSource {
    pub name: String,
    pub staking: Address,
    pub accounts: Vec<AccountRole>,
}

/// A configured constant-product pool.
#[derive(Debug, Clone)]
pub struct Pool {
    pub name: String,
    pub pair: Address,
    pub staking: Option<Address>,
}

/// Resolved sweep parameters.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub liquidity_pool: String,
    pub slippage_bps: u16,
    pub deadline_window_secs: u64,
    pub fee_bps: u16,
}

impl Deployment {
    /// Resolve and validate a parsed deployment file.
    pub fn resolve(file: DeploymentFile) -> Result<Self> {
        let chain = resolve_chain(&file.chain)?;

        let contracts = Contracts {
            router: parse_address(&file.contracts.router, "contracts.router")?,
            router_flavor: file.contracts.router_flavor,
            hub_token: parse_address(&file.contracts.hub_token, "contracts.hub_token")?,
            reward_token: parse_address(&file.contracts.reward_token, "contracts.reward_token")?,
            reward_staking: parse_address(
                &file.contracts.reward_staking,
                "contracts.reward_staking",
            )?,
        };

        let mut roles = BTreeSet::new();
        let mut accounts = Vec::with_capacity(file.accounts.len());
        for entry in &file.accounts {
            if !roles.insert(entry.role.clone()) {
                anyhow::bail!("account role `{}` configured twice", entry.role);
            }
            let key = expand_env_required(
                &entry.private_key,
                &format!("private key for `{}`", entry.role),
            )?;
            accounts.push(Account {
                role: AccountRole::new(&entry.role),
                key,
                primary: entry.primary,
            });
        }

        let primaries: Vec<usize> = accounts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.primary)
            .map(|(i, _)| i)
            .collect();
        let primary = match primaries.as_slice() {
            [index] => *index,
            [] => anyhow::bail!("no primary account configured"),
            _ => anyhow::bail!("{} accounts are marked primary, expected one", primaries.len()),
        };

        let reward_sources = file
            .reward_sources
            .iter()
            .map(|source| {
                let members = if source.accounts.is_empty() {
                    accounts.iter().map(|a| a.role.clone()).collect()
                } else {
                    source
                        .accounts
                        .iter()
                        .map(|role| {
                            if roles.contains(role) {
                                Ok(AccountRole::new(role))
                            } else {
                                Err(anyhow::anyhow!(
                                    "reward source `{}` references unknown account `{role}`",
                                    source.name
                                ))
                            }
                        })
                        .collect::<Result<Vec<_>>>()?
                };
                Ok(RewardSource {
                    name: source.name.clone(),
                    staking: parse_address(&source.staking, &format!("{}.staking", source.name))?,
                    accounts: members,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut names = BTreeSet::new();
        let pools = file
            .pools
            .iter()
            .map(|pool| {
                if !names.insert(pool.name.clone()) {
                    anyhow::bail!("pool `{}` configured twice", pool.name);
                }
                resolve_pool(pool)
            })
            .collect::<Result<Vec<_>>>()?;

        let sweep = SweepSettings {
            liquidity_pool: file.sweep.liquidity_pool.clone(),
            slippage_bps: file.sweep.slippage_bps,
            deadline_window_secs: file.sweep.deadline_window_secs,
            fee_bps: file.sweep.fee_bps,
        };
        if sweep.slippage_bps >= 10_000 || sweep.fee_bps >= 10_000 {
            anyhow::bail!("slippage and fee must be below 10000 bps");
        }
        match pools.iter().find(|p| p.name == sweep.liquidity_pool) {
            Some(pool) if pool.staking.is_some() => {}
            Some(_) => anyhow::bail!(
                "liquidity pool `{}` has no staking contract",
                sweep.liquidity_pool
            ),
            None => anyhow::bail!("liquidity pool `{}` is not configured", sweep.liquidity_pool),
        }

        Ok(Self {
            name: file.deployment.name.clone(),
            reference_symbol: file.deployment.reference_symbol.clone(),
            native_floor: parse_amount(&file.deployment.native_floor, NATIVE_DECIMALS)
                .context("deployment.native_floor")?,
            topup_target: parse_amount(&file.deployment.topup_target, NATIVE_DECIMALS)
                .context("deployment.topup_target")?,
            chain,
            contracts,
            accounts,
            reward_sources,
            pools,
            sweep,
            primary,
        })
    }

    /// Every configured account, in configuration order.
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// The account that receives consolidated balances and runs the LP steps.
    pub fn primary(&self) -> &Account {
        &self.accounts[self.primary]
    }

    /// Every non-primary account, in configuration order.
    pub fn secondaries(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|a| !a.primary)
    }

    pub fn pool(&self, name: &str) -> Option<&Pool> {
        self.pools.iter().find(|p| p.name == name)
    }

    /// The sweep's liquidity pool and its LP staking contract.
    pub fn liquidity_pool(&self) -> FarmResult<(&Pool, Address)> {
        let name = &self.sweep.liquidity_pool;
        let pool = self
            .pool(name)
            .ok_or_else(|| FarmError::Config(format!("liquidity pool `{name}` is not configured")))?;
        let staking = pool
            .staking
            .ok_or_else(|| FarmError::Config(format!("liquidity pool `{name}` has no staking contract")))?;
        Ok((pool, staking))
    }

    /// Pools whose LP token is farmed, with their staking contract.
    pub fn staked_pools(&self) -> impl Iterator<Item = (&Pool, Address)> {
        self.pools
            .iter()
            .filter_map(|p| p.staking.map(|staking| (p, staking)))
    }

    pub fn pair_addresses(&self) -> Vec<Address> {
        self.pools.iter().map(|p| p.pair).collect()
    }

    /// Build the signer set for every configured account.
    pub fn signers(&self) -> ChainResult<AccountSigners> {
        let mut signers = AccountSigners::new();
        for account in &self.accounts {
            signers.insert(account.role.clone(), &account.key)?;
        }
        Ok(signers)
    }
}

fn resolve_chain(section: &ChainSection) -> Result<ChainSettings> {
    Ok(ChainSettings {
        chain_id: section.chain_id,
        name: section.name.clone(),
        native_symbol: section.native_symbol.clone(),
        hub_symbol: section.hub_symbol.clone(),
        rpc_url: expand_env_required(&section.rpc_url, "chain.rpc_url")?,
        block_time: section.block_time(),
        gas: section.gas.pricing(),
    })
}

fn resolve_pool(entry: &PoolEntry) -> Result<Pool> {
    Ok(Pool {
        name: entry.name.clone(),
        pair: parse_address(&entry.pair, &format!("{}.pair", entry.name))?,
        staking: entry
            .staking
            .as_deref()
            .map(|s| parse_address(s, &format!("{}.staking", entry.name)))
            .transpose()?,
    })
}

fn parse_address(value: &str, what: &str) -> Result<Address> {
    let value = expand_env_required(value, what)?;
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address for {what} '{value}': {e}"))
}

/// Deployment loader for a config directory.
pub struct DeploymentLoader {
    /// Config directory path
    config_dir: PathBuf,
}

impl DeploymentLoader {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the deployment file for `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.config_dir
            .join("deployments")
            .join(format!("{name}.toml"))
    }

    /// Load a deployment by name.
    pub fn load(&self, deployment_name: &str) -> Result<Deployment> {
        let path = self.path_for(deployment_name);
        info!(deployment = deployment_name, path = %path.display(), "Loading deployment configuration");

        let file = DeploymentFile::from_file(&path)
            .with_context(|| format!("Failed to load deployment from {:?}", path))?;
        let deployment = Deployment::resolve(file)
            .with_context(|| format!("Invalid deployment '{deployment_name}'"))?;

        info!(
            deployment = %deployment.name,
            chain = %deployment.chain.name,
            accounts = deployment.accounts().len(),
            pools = deployment.pools.len(),
            reward_sources = deployment.reward_sources.len(),
            "Deployment loaded"
        );

        Ok(deployment)
    }

    /// Names of every deployment file in the directory.
    pub fn available_deployments(&self) -> Result<Vec<String>> {
        let dir = self.config_dir.join("deployments");
        let mut names: Vec<String> = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {:?}", dir))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                (path.extension()? == "toml")
                    .then(|| path.file_stem()?.to_str().map(str::to_string))
                    .flatten()
            })
            .collect();
        names.sort();
        Ok(names)
    }
}
