//! Cross-asset price queries over a [`PriceGraph`] through the hub token.

use super::graph::PriceGraph;
use crate::error::{FarmError, FarmResult};

/// Answers `resolve(in, out)`: how many units of `in` one unit of `out` is worth.
///
/// The native currency symbol is an alias of the hub (wrapped native) symbol.
/// Any two non-hub assets are connected through exactly one hub hop.
#[derive(Debug, Clone, Copy)]
pub struct PriceResolver<'g> {
    graph: &'g PriceGraph,
    native_symbol: &'g str,
    hub_symbol: &'g str,
}

impl<'g> PriceResolver<'g> {
    pub fn new(graph: &'g PriceGraph, native_symbol: &'g str, hub_symbol: &'g str) -> Self {
        Self {
            graph,
            native_symbol,
            hub_symbol,
        }
    }

    /// Map the native currency onto the hub token.
    fn canonical<'a>(&'a self, symbol: &'a str) -> &'a str {
        if symbol == self.native_symbol {
            self.hub_symbol
        } else {
            symbol
        }
    }

    /// Units of `in_symbol` per one unit of `out_symbol`.
    pub fn resolve(&self, in_symbol: &str, out_symbol: &str) -> FarmResult<f64> {
        let input = self.canonical(in_symbol);
        let output = self.canonical(out_symbol);

        if input == output {
            return Ok(1.0);
        }

        let rate = if input == self.hub_symbol || output == self.hub_symbol {
            self.direct(output, input)
        } else {
            self.direct(output, self.hub_symbol)
                .zip(self.direct(self.hub_symbol, input))
                .map(|(to_hub, from_hub)| to_hub * from_hub)
        };

        rate.ok_or_else(|| FarmError::price_unavailable(in_symbol, out_symbol))
    }

    /// Value of `amount` units of `symbol` expressed in `reference`.
    pub fn value_in(&self, reference: &str, symbol: &str, amount: f64) -> FarmResult<f64> {
        Ok(amount * self.resolve(reference, symbol)?)
    }

    /// Rate of the direct edge `from -> to`, if the edge exists and is defined.
    fn direct(&self, from: &str, to: &str) -> Option<f64> {
        self.graph.edge(from, to).and_then(|e| e.rate)
    }
}
