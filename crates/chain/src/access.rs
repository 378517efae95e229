//! Chain-access port.
//!
//! The core never talks to an RPC endpoint directly. Every read, gas
//! estimate, submission and confirmation wait goes through [`ChainAccess`],
//! which lets the pipeline run against the alloy-backed [`crate::RpcChain`]
//! in production and against fixed in-memory state in tests.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias for chain-access operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Failures surfaced by a chain-access implementation.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A read-only query could not complete.
    #[error("read `{what}` failed: {reason}")]
    Read { what: String, reason: String },

    /// Gas estimation failed; the call would revert.
    #[error("gas estimation for `{label}` failed: {reason}")]
    Estimate { label: String, reason: String },

    /// The signed call could not be submitted.
    #[error("submission of `{label}` failed: {reason}")]
    Submit { label: String, reason: String },

    /// The receipt for a submitted call could not be obtained.
    #[error("receipt for {hash} unavailable: {reason}")]
    Receipt { hash: TxHash, reason: String },

    /// No signer is bound to the requested account role.
    #[error("unknown account role `{0}`")]
    UnknownAccount(String),

    /// A configured private key could not be parsed.
    #[error("invalid signer key for `{role}`: {reason}")]
    Signer { role: String, reason: String },

    /// The RPC endpoint could not be parsed or reached.
    #[error("rpc endpoint `{url}` unusable: {reason}")]
    Endpoint { url: String, reason: String },
}

impl ChainError {
    pub fn read(what: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Read {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn estimate(label: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Estimate {
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    pub fn submit(label: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Submit {
            label: label.into(),
            reason: reason.to_string(),
        }
    }
}

/// Opaque account identity (e.g. `main`, `genesis`, `land`).
///
/// The chain adapter maps roles to signing keys; the core only passes them
/// through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountRole(String);

impl AccountRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountRole {
    fn from(role: &str) -> Self {
        Self::new(role)
    }
}

/// A state-changing call, fully encoded and ready to be estimated or sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Account that signs and pays for the call
    pub from: AccountRole,
    /// Target contract (or recipient for a plain native transfer)
    pub to: Address,
    /// ABI-encoded calldata (empty for a native transfer)
    pub input: Bytes,
    /// Native value attached to the call
    pub value: U256,
    /// Human-readable label used in logs and errors
    pub label: String,
}

impl ContractCall {
    /// Encode a typed `sol!` call. The label defaults to the function signature.
    pub fn encode<C: SolCall>(from: AccountRole, to: Address, call: &C) -> Self {
        Self {
            from,
            to,
            input: Bytes::from(call.abi_encode()),
            value: U256::ZERO,
            label: C::SIGNATURE.to_string(),
        }
    }

    /// A plain native-currency transfer.
    pub fn native_transfer(from: AccountRole, to: Address, value: U256) -> Self {
        Self {
            from,
            to,
            input: Bytes::new(),
            value,
            label: "transfer(native)".to_string(),
        }
    }

    /// 4-byte selector of the encoded call, if any.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).map(|s| [s[0], s[1], s[2], s[3]])
    }
}

/// ERC-20 metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Point-in-time reserves of a constant-product pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairReserves {
    pub reserve0: U256,
    pub reserve1: U256,
    /// Pair's last-update timestamp (seconds)
    pub timestamp: u64,
}

/// Outcome of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    /// `false` when the call reverted on chain
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Read, estimate, submit and confirm against an EVM chain.
///
/// Reads carry no ordering dependency and may be issued concurrently.
/// Submissions are issued one at a time by the caller, each followed by
/// [`ChainAccess::wait_for_receipt`].
#[async_trait]
pub trait ChainAccess: Send + Sync {
    /// Address controlled by the given account role.
    async fn address_of(&self, account: &AccountRole) -> ChainResult<Address>;

    /// Native-currency balance.
    async fn native_balance(&self, owner: Address) -> ChainResult<U256>;

    /// ERC-20 symbol and decimals.
    async fn token_metadata(&self, token: Address) -> ChainResult<TokenMetadata>;

    /// ERC-20 (or LP token) balance.
    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256>;

    /// ERC-20 allowance granted by `owner` to `spender`.
    async fn token_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> ChainResult<U256>;

    /// ERC-20 (or LP token) total supply.
    async fn total_supply(&self, token: Address) -> ChainResult<U256>;

    /// `(token0, token1)` of a pair.
    async fn pair_tokens(&self, pair: Address) -> ChainResult<(Address, Address)>;

    /// Current reserves of a pair.
    async fn pair_reserves(&self, pair: Address) -> ChainResult<PairReserves>;

    /// Unclaimed rewards accrued by `owner` at a staking contract.
    async fn pending_rewards(&self, staking: Address, owner: Address) -> ChainResult<U256>;

    /// Principal staked by `owner` at a staking contract.
    async fn staking_amount(&self, staking: Address, owner: Address) -> ChainResult<U256>;

    /// Timestamp of the latest block.
    async fn block_timestamp(&self) -> ChainResult<u64>;

    /// Gas required by `call`. Fails when the call would revert.
    async fn estimate_gas(&self, call: &ContractCall) -> ChainResult<u64>;

    /// Sign and send `call` with the given gas allowance.
    async fn submit(&self, call: &ContractCall, gas_limit: u64) -> ChainResult<TxHash>;

    /// Block until the transaction is mined.
    async fn wait_for_receipt(&self, hash: TxHash) -> ChainResult<TxReceipt>;
}
