//! Farmer chain interaction layer.
//!
//! This crate provides:
//! - The [`ChainAccess`] port the maintenance pipeline is written against
//! - Contract bindings for ERC-20 tokens, AMM pairs, routers and staking pools
//! - Per-account transaction signing
//! - Gas pricing abstraction (Legacy + EIP-1559)
//! - An alloy-backed [`RpcChain`] implementation of the port

mod access;
pub mod contracts;
pub mod gas;
mod rpc;
mod signer;

pub use access::{
    AccountRole, ChainAccess, ChainError, ChainResult, ContractCall, PairReserves, TokenMetadata,
    TxReceipt,
};
pub use contracts::RouterFlavor;
pub use gas::GasPricing;
pub use rpc::RpcChain;
pub use signer::AccountSigners;
