//! Price graph built from the current reserves of the configured pools.

use crate::error::{FarmError, FarmResult};
use crate::units::{to_f64, whole_units};
use alloy::primitives::Address;
use farmer_chain::{ChainAccess, PairReserves, TokenMetadata};
use futures::future::try_join_all;
use std::collections::BTreeSet;
use tracing::debug;

/// Point-in-time view of one pair: both tokens and their reserves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub pair: Address,
    pub token0: TokenMetadata,
    pub token1: TokenMetadata,
    pub reserves: PairReserves,
}

impl PoolSnapshot {
    /// Read tokens, metadata and reserves of `pair`.
    ///
    /// The pair's own reads and the two metadata lookups are issued concurrently.
    pub async fn read(chain: &dyn ChainAccess, pair: Address) -> FarmResult<Self> {
        let (tokens, reserves) = tokio::try_join!(chain.pair_tokens(pair), chain.pair_reserves(pair))
            .map_err(FarmError::from)?;
        let (token0, token1) =
            tokio::try_join!(chain.token_metadata(tokens.0), chain.token_metadata(tokens.1))
                .map_err(FarmError::from)?;

        Ok(Self {
            pair,
            token0,
            token1,
            reserves,
        })
    }

    /// Reserve held for `token`, if it is one of the pair's tokens.
    pub fn reserve_of(&self, token: Address) -> Option<alloy::primitives::U256> {
        if token == self.token0.address {
            Some(self.reserves.reserve0)
        } else if token == self.token1.address {
            Some(self.reserves.reserve1)
        } else {
            None
        }
    }

    /// Both directed edges of this pool.
    ///
    /// Reserves are reduced to whole token units before the ratio is taken.
    pub fn edges(&self) -> [PriceEdge; 2] {
        let r0 = to_f64(whole_units(self.reserves.reserve0, self.token0.decimals));
        let r1 = to_f64(whole_units(self.reserves.reserve1, self.token1.decimals));
        let defined = r0 > 0.0 && r1 > 0.0;

        [
            PriceEdge {
                in_symbol: self.token0.symbol.clone(),
                out_symbol: self.token1.symbol.clone(),
                rate: defined.then(|| r1 / r0),
            },
            PriceEdge {
                in_symbol: self.token1.symbol.clone(),
                out_symbol: self.token0.symbol.clone(),
                rate: defined.then(|| r0 / r1),
            },
        ]
    }
}

/// Directed price edge: one unit of `in_symbol` is worth `rate` units of
/// `out_symbol`. Undefined while either reserve rounds to zero whole units.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceEdge {
    pub in_symbol: String,
    pub out_symbol: String,
    pub rate: Option<f64>,
}

/// Every edge of every configured pool, rebuilt per query.
#[derive(Debug, Clone, Default)]
pub struct PriceGraph {
    edges: Vec<PriceEdge>,
    pools: Vec<PoolSnapshot>,
}

impl PriceGraph {
    /// Build the graph from already-read pool snapshots.
    pub fn from_snapshots(pools: Vec<PoolSnapshot>) -> Self {
        let edges = pools.iter().flat_map(PoolSnapshot::edges).collect();
        Self { edges, pools }
    }

    /// Read every pair concurrently and build the graph.
    ///
    /// Fails as a whole if any single pool cannot be read.
    pub async fn build(chain: &dyn ChainAccess, pairs: &[Address]) -> FarmResult<Self> {
        let pools = try_join_all(pairs.iter().map(|pair| PoolSnapshot::read(chain, *pair))).await?;
        let graph = Self::from_snapshots(pools);
        debug!(pools = graph.pools.len(), edges = graph.edges.len(), "Price graph built");
        Ok(graph)
    }

    pub fn edges(&self) -> &[PriceEdge] {
        &self.edges
    }

    pub fn pools(&self) -> &[PoolSnapshot] {
        &self.pools
    }

    pub fn pool(&self, pair: Address) -> Option<&PoolSnapshot> {
        self.pools.iter().find(|p| p.pair == pair)
    }

    /// First edge from `in_symbol` to `out_symbol`.
    pub fn edge(&self, in_symbol: &str, out_symbol: &str) -> Option<&PriceEdge> {
        self.edges
            .iter()
            .find(|e| e.in_symbol == in_symbol && e.out_symbol == out_symbol)
    }

    /// Every symbol that appears in a pool.
    pub fn symbols(&self) -> BTreeSet<&str> {
        self.edges.iter().map(|e| e.in_symbol.as_str()).collect()
    }

    /// Metadata of a token seen in any pool.
    pub fn token(&self, symbol: &str) -> Option<&TokenMetadata> {
        self.pools
            .iter()
            .flat_map(|p| [&p.token0, &p.token1])
            .find(|t| t.symbol == symbol)
    }
}
