//! Balance and position aggregation across the configured accounts.
//!
//! Every query reads fresh on-chain state. Independent reads (accounts,
//! pools, staking contracts) are fanned out concurrently and joined.

use crate::config::{Deployment, Pool};
use crate::error::{FarmError, FarmResult};
use crate::price::{PoolSnapshot, PriceGraph, PriceResolver};
use crate::units::{normalize, round_display};
use alloy::primitives::{Address, U256};
use farmer_chain::{AccountRole, ChainAccess, TokenMetadata};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::debug;

/// Native currency and LP token precision.
const NATIVE_DECIMALS: u8 = 18;

/// A raw on-chain amount together with the token it is denominated in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amount {
    pub symbol: String,
    pub raw: U256,
    pub decimals: u8,
}

impl Amount {
    pub fn new(symbol: impl Into<String>, raw: U256, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            raw,
            decimals,
        }
    }

    /// Amount in decimal units, unrounded.
    pub fn value(&self) -> f64 {
        normalize(self.raw, self.decimals)
    }

    /// Amount rounded for display.
    pub fn display(&self) -> f64 {
        round_display(self.value())
    }
}

/// One account's holding of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAmount {
    pub role: AccountRole,
    pub address: Address,
    pub amount: Amount,
}

/// Pending reward at one staking contract for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReward {
    /// Reward source or pool name
    pub source: String,
    pub role: AccountRole,
    pub amount: Amount,
}

/// Every pending reward the deployment can claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSummary {
    /// Per-account rewards at each reward source
    pub reward_sources: Vec<PendingReward>,
    /// Primary account's reward at the reward staking contract
    pub staking: PendingReward,
    /// Primary account's reward at each LP staking contract
    pub lp: Vec<PendingReward>,
}

impl PendingSummary {
    /// Sum of LP staking rewards (native currency).
    pub fn lp_total(&self) -> Amount {
        let raw = self
            .lp
            .iter()
            .fold(U256::ZERO, |acc, p| acc.saturating_add(p.amount.raw));
        let symbol = self
            .lp
            .first()
            .map(|p| p.amount.symbol.clone())
            .unwrap_or_default();
        Amount::new(symbol, raw, NATIVE_DECIMALS)
    }
}

/// One token of a staked LP position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnedToken {
    pub symbol: String,
    /// Owned amount in decimal units
    pub amount: f64,
    /// Value in the reference currency
    pub value: f64,
}

/// Share of a pool owned through staked LP tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LpPosition {
    pub pool: String,
    /// Fraction of the LP supply owned
    pub share: f64,
    pub token0: OwnedToken,
    pub token1: OwnedToken,
}

impl LpPosition {
    pub fn total_value(&self) -> f64 {
        self.token0.value + self.token1.value
    }

    /// Derive the position from a pool snapshot.
    ///
    /// The share is taken in normalized decimal space, then applied to each
    /// normalized reserve and valued in `reference`.
    pub fn from_snapshot(
        name: &str,
        snapshot: &PoolSnapshot,
        staked: U256,
        total_supply: U256,
        resolver: &PriceResolver<'_>,
        reference: &str,
    ) -> FarmResult<Self> {
        let supply = normalize(total_supply, NATIVE_DECIMALS);
        let share = if supply > 0.0 {
            normalize(staked, NATIVE_DECIMALS) / supply
        } else {
            0.0
        };

        let owned = |token: &TokenMetadata, reserve: U256| -> FarmResult<OwnedToken> {
            let amount = normalize(reserve, token.decimals) * share;
            Ok(OwnedToken {
                symbol: token.symbol.clone(),
                amount,
                value: resolver.value_in(reference, &token.symbol, amount)?,
            })
        };

        Ok(Self {
            pool: name.to_string(),
            share,
            token0: owned(&snapshot.token0, snapshot.reserves.reserve0)?,
            token1: owned(&snapshot.token1, snapshot.reserves.reserve1)?,
        })
    }
}

/// One valued line of the portfolio report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioLine {
    pub label: String,
    pub symbol: String,
    pub amount: f64,
    pub value: f64,
}

/// Consolidated valuation of every balance and position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioReport {
    pub deployment: String,
    pub reference_symbol: String,
    pub lines: Vec<PortfolioLine>,
    pub lp_positions: Vec<LpPosition>,
    pub total_value: f64,
}

impl PortfolioReport {
    /// Copy with every amount and value rounded for display.
    pub fn rounded(&self) -> Self {
        let round_token = |t: &OwnedToken| OwnedToken {
            symbol: t.symbol.clone(),
            amount: round_display(t.amount),
            value: round_display(t.value),
        };
        Self {
            deployment: self.deployment.clone(),
            reference_symbol: self.reference_symbol.clone(),
            lines: self
                .lines
                .iter()
                .map(|l| PortfolioLine {
                    label: l.label.clone(),
                    symbol: l.symbol.clone(),
                    amount: round_display(l.amount),
                    value: round_display(l.value),
                })
                .collect(),
            lp_positions: self
                .lp_positions
                .iter()
                .map(|p| LpPosition {
                    pool: p.pool.clone(),
                    share: p.share,
                    token0: round_token(&p.token0),
                    token1: round_token(&p.token1),
                })
                .collect(),
            total_value: round_display(self.total_value),
        }
    }
}

/// Price of one unit of `symbol` in `quote`; `None` when no edge path exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRow {
    pub symbol: String,
    pub quote: String,
    pub price: Option<f64>,
}

impl PriceRow {
    fn resolve(resolver: &PriceResolver<'_>, symbol: &str, quote: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            quote: quote.to_string(),
            price: resolver.resolve(quote, symbol).ok(),
        }
    }
}

/// Reference-currency prices plus cross prices between the hub's paired assets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTable {
    pub reference_symbol: String,
    /// Every priced asset in the reference currency, native first
    pub reference: Vec<PriceRow>,
    /// Every asset quoted in each non-hub paired asset
    pub cross: Vec<PriceRow>,
}

impl PriceTable {
    /// The native symbol stands in for the hub token; the reference is never priced in itself.
    pub fn from_graph(
        graph: &PriceGraph,
        native_symbol: &str,
        hub_symbol: &str,
        reference: &str,
    ) -> Self {
        let resolver = PriceResolver::new(graph, native_symbol, hub_symbol);
        let paired: Vec<&str> = graph
            .symbols()
            .into_iter()
            .filter(|s| *s != hub_symbol && *s != native_symbol && *s != reference)
            .collect();
        let assets: Vec<&str> = std::iter::once(native_symbol)
            .filter(|s| *s != reference)
            .chain(paired.iter().copied())
            .collect();

        let reference_rows = assets
            .iter()
            .map(|symbol| PriceRow::resolve(&resolver, symbol, reference))
            .collect();

        let mut cross = Vec::new();
        for quote in &paired {
            for symbol in assets.iter().filter(|s| *s != quote) {
                cross.push(PriceRow::resolve(&resolver, symbol, quote));
            }
        }

        Self {
            reference_symbol: reference.to_string(),
            reference: reference_rows,
            cross,
        }
    }
}

/// Reads balances, staking positions and pending rewards.
pub struct PositionReader<'a> {
    chain: &'a dyn ChainAccess,
    deployment: &'a Deployment,
}

impl<'a> PositionReader<'a> {
    pub fn new(chain: &'a dyn ChainAccess, deployment: &'a Deployment) -> Self {
        Self { chain, deployment }
    }

    /// Address of every configured account, in configuration order.
    pub async fn addresses(&self) -> FarmResult<Vec<(AccountRole, Address)>> {
        try_join_all(self.deployment.accounts().iter().map(|account| async move {
            let address = self.chain.address_of(&account.role).await?;
            Ok::<_, FarmError>((account.role.clone(), address))
        }))
        .await
    }

    async fn primary_address(&self) -> FarmResult<Address> {
        Ok(self.chain.address_of(&self.deployment.primary().role).await?)
    }

    /// Native balance of every account.
    pub async fn native_balances(&self) -> FarmResult<Vec<AccountAmount>> {
        let symbol = &self.deployment.chain.native_symbol;
        let addresses = self.addresses().await?;
        try_join_all(addresses.into_iter().map(|(role, address)| async move {
            let raw = self.chain.native_balance(address).await?;
            Ok::<_, FarmError>(AccountAmount {
                role,
                address,
                amount: Amount::new(symbol, raw, NATIVE_DECIMALS),
            })
        }))
        .await
    }

    /// Find a token by symbol among the configured contracts and pool tokens.
    pub async fn find_token(&self, symbol: &str) -> FarmResult<TokenMetadata> {
        let contracts = &self.deployment.contracts;
        let pairs = try_join_all(
            self.deployment
                .pools
                .iter()
                .map(|pool| self.chain.pair_tokens(pool.pair)),
        )
        .await?;

        let mut candidates = vec![contracts.reward_token, contracts.hub_token];
        for (token0, token1) in pairs {
            candidates.extend([token0, token1]);
        }
        candidates.sort();
        candidates.dedup();

        let metadata =
            try_join_all(candidates.iter().map(|token| self.chain.token_metadata(*token))).await?;
        metadata
            .into_iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| FarmError::Config(format!("unknown token symbol `{symbol}`")))
    }

    /// Balance of `symbol` for every account; the native symbol reads native balances.
    pub async fn token_balances(&self, symbol: &str) -> FarmResult<Vec<AccountAmount>> {
        if symbol.eq_ignore_ascii_case(&self.deployment.chain.native_symbol) {
            return self.native_balances().await;
        }

        let (token, addresses) = tokio::try_join!(self.find_token(symbol), self.addresses())?;
        let token = &token;
        try_join_all(addresses.into_iter().map(|(role, address)| async move {
            let raw = self.chain.token_balance(token.address, address).await?;
            Ok::<_, FarmError>(AccountAmount {
                role,
                address,
                amount: Amount::new(&token.symbol, raw, token.decimals),
            })
        }))
        .await
    }

    /// Primary account's principal at the reward staking contract.
    pub async fn staked_principal(&self) -> FarmResult<AccountAmount> {
        let contracts = &self.deployment.contracts;
        let address = self.primary_address().await?;
        let (reward, raw) = tokio::try_join!(
            self.chain.token_metadata(contracts.reward_token),
            self.chain.staking_amount(contracts.reward_staking, address),
        )?;

        Ok(AccountAmount {
            role: self.deployment.primary().role.clone(),
            address,
            amount: Amount::new(reward.symbol, raw, reward.decimals),
        })
    }

    /// Every pending reward: reward sources per account, reward staking, LP staking.
    pub async fn pending(&self) -> FarmResult<PendingSummary> {
        let deployment = self.deployment;
        let contracts = &deployment.contracts;
        let native = &deployment.chain.native_symbol;

        let (reward, addresses) = tokio::try_join!(
            async { Ok::<_, FarmError>(self.chain.token_metadata(contracts.reward_token).await?) },
            self.addresses(),
        )?;
        let address_of = |role: &AccountRole| {
            addresses
                .iter()
                .find(|(r, _)| r == role)
                .map(|(_, a)| *a)
                .ok_or_else(|| FarmError::Config(format!("account `{role}` has no address")))
        };
        let primary = address_of(&deployment.primary().role)?;

        let mut source_reads = Vec::new();
        for source in &deployment.reward_sources {
            for role in &source.accounts {
                source_reads.push((source, role, address_of(role)?));
            }
        }

        let reward = &reward;
        let sources = try_join_all(source_reads.into_iter().map(|(source, role, address)| async move {
            let raw = self.chain.pending_rewards(source.staking, address).await?;
            Ok::<_, FarmError>(PendingReward {
                source: source.name.clone(),
                role: role.clone(),
                amount: Amount::new(&reward.symbol, raw, reward.decimals),
            })
        }));

        let staking = async {
            let raw = self
                .chain
                .pending_rewards(contracts.reward_staking, primary)
                .await?;
            Ok::<_, FarmError>(PendingReward {
                source: format!("{} staking", reward.symbol),
                role: deployment.primary().role.clone(),
                amount: Amount::new(&reward.symbol, raw, reward.decimals),
            })
        };

        let lp = try_join_all(deployment.staked_pools().map(|(pool, staking)| async move {
            let raw = self.chain.pending_rewards(staking, primary).await?;
            Ok::<_, FarmError>(PendingReward {
                source: pool.name.clone(),
                role: deployment.primary().role.clone(),
                amount: Amount::new(native, raw, NATIVE_DECIMALS),
            })
        }));

        let (reward_sources, staking, lp) = tokio::try_join!(sources, staking, lp)?;
        Ok(PendingSummary {
            reward_sources,
            staking,
            lp,
        })
    }

    /// Primary account's staked LP position in `pool`, valued through `graph`.
    pub async fn lp_position(
        &self,
        pool: &Pool,
        staking: Address,
        graph: &PriceGraph,
    ) -> FarmResult<LpPosition> {
        let address = self.primary_address().await?;
        let (staked, supply) = tokio::try_join!(
            self.chain.staking_amount(staking, address),
            self.chain.total_supply(pool.pair),
        )?;

        let snapshot = match graph.pool(pool.pair) {
            Some(snapshot) => snapshot.clone(),
            None => PoolSnapshot::read(self.chain, pool.pair).await?,
        };

        let resolver = self.resolver(graph);
        LpPosition::from_snapshot(
            &pool.name,
            &snapshot,
            staked,
            supply,
            &resolver,
            &self.deployment.reference_symbol,
        )
    }

    pub fn resolver<'g>(&'g self, graph: &'g PriceGraph) -> PriceResolver<'g> {
        PriceResolver::new(
            graph,
            &self.deployment.chain.native_symbol,
            &self.deployment.chain.hub_symbol,
        )
    }

    /// Build the price graph over every configured pool.
    pub async fn price_graph(&self) -> FarmResult<PriceGraph> {
        PriceGraph::build(self.chain, &self.deployment.pair_addresses()).await
    }

    /// Price table over a freshly built graph.
    pub async fn price_table(&self) -> FarmResult<PriceTable> {
        let graph = self.price_graph().await?;
        let chain = &self.deployment.chain;
        let table = PriceTable::from_graph(
            &graph,
            &chain.native_symbol,
            &chain.hub_symbol,
            &self.deployment.reference_symbol,
        );
        debug!(
            reference = table.reference.len(),
            cross = table.cross.len(),
            "Price table built"
        );
        Ok(table)
    }

    /// Value every balance and position in the reference currency.
    pub async fn portfolio(&self) -> FarmResult<PortfolioReport> {
        let (graph, balances, staked, pending) = tokio::try_join!(
            self.price_graph(),
            self.native_balances(),
            self.staked_principal(),
            self.pending(),
        )?;

        let resolver = self.resolver(&graph);
        let reference = self.deployment.reference_symbol.as_str();
        let line = |label: String, amount: &Amount| -> FarmResult<PortfolioLine> {
            let value = amount.value();
            Ok(PortfolioLine {
                label,
                symbol: amount.symbol.clone(),
                amount: value,
                value: resolver.value_in(reference, &amount.symbol, value)?,
            })
        };

        let mut lines = Vec::new();
        for balance in &balances {
            lines.push(line(
                format!("{} ({})", balance.amount.symbol, balance.role),
                &balance.amount,
            )?);
        }
        lines.push(line(format!("{} staked", staked.amount.symbol), &staked.amount)?);
        lines.push(line(pending.staking.source.clone() + " pending", &pending.staking.amount)?);
        for reward in &pending.reward_sources {
            lines.push(line(
                format!("{} pending ({})", reward.source, reward.role),
                &reward.amount,
            )?);
        }
        for reward in &pending.lp {
            lines.push(line(format!("{} LP pending", reward.source), &reward.amount)?);
        }

        let lp_positions = try_join_all(
            self.deployment
                .staked_pools()
                .map(|(pool, staking)| self.lp_position(pool, staking, &graph)),
        )
        .await?;

        let total_value = lines.iter().map(|l| l.value).sum::<f64>()
            + lp_positions.iter().map(LpPosition::total_value).sum::<f64>();

        debug!(
            lines = lines.len(),
            lp_positions = lp_positions.len(),
            total_value,
            "Portfolio valued"
        );

        Ok(PortfolioReport {
            deployment: self.deployment.name.clone(),
            reference_symbol: reference.to_string(),
            lines,
            lp_positions,
            total_value,
        })
    }
}
