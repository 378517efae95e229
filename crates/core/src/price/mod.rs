//! Price graph and hub-token resolver.

mod graph;
mod resolver;

pub use graph::{PoolSnapshot, PriceEdge, PriceGraph};
pub use resolver::PriceResolver;
