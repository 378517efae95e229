//! Failure taxonomy for the maintenance pipeline.

use alloy::primitives::{TxHash, U256};
use farmer_chain::ChainError;
use thiserror::Error;

/// Result alias used throughout the core.
pub type FarmResult<T> = Result<T, FarmError>;

/// Every failure is fatal to the current step and aborts the remaining ones.
#[derive(Debug, Error)]
pub enum FarmError {
    /// A balance floor or similar precondition was not met.
    #[error("insufficient {symbol} balance: {balance} does not exceed floor {floor}")]
    InsufficientBalance {
        symbol: String,
        balance: U256,
        floor: U256,
    },

    /// No edge path exists for the requested price.
    #[error("no price available for {out_symbol} in {in_symbol}")]
    PriceUnavailable {
        in_symbol: String,
        out_symbol: String,
    },

    /// Gas estimation failed; the call would revert and was not submitted.
    #[error("`{label}` would revert: {reason}")]
    EstimationFailure { label: String, reason: String },

    /// A submitted call reverted or its confirmation could not complete.
    #[error("`{label}` failed to confirm: {reason}")]
    ConfirmationFailure {
        label: String,
        hash: Option<TxHash>,
        reason: String,
    },

    /// A read-only query could not complete.
    #[error("read failed: {0}")]
    ReadFailure(#[source] ChainError),

    /// The deployment configuration is inconsistent with on-chain state.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FarmError {
    pub fn insufficient(symbol: impl Into<String>, balance: U256, floor: U256) -> Self {
        Self::InsufficientBalance {
            symbol: symbol.into(),
            balance,
            floor,
        }
    }

    pub fn price_unavailable(in_symbol: &str, out_symbol: &str) -> Self {
        Self::PriceUnavailable {
            in_symbol: in_symbol.to_string(),
            out_symbol: out_symbol.to_string(),
        }
    }

    /// Map a failure from the submission phase (submit, receipt wait).
    pub fn confirmation(label: &str, hash: Option<TxHash>, err: ChainError) -> Self {
        Self::ConfirmationFailure {
            label: label.to_string(),
            hash,
            reason: err.to_string(),
        }
    }

    /// Whether the failure happened before anything was submitted.
    pub fn is_pre_submission(&self) -> bool {
        !matches!(self, Self::ConfirmationFailure { .. })
    }
}

/// Chain errors map by phase: estimation failures keep their meaning, anything
/// raised while submitting or waiting is a confirmation failure, the rest are reads.
impl From<ChainError> for FarmError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Estimate { label, reason } => Self::EstimationFailure { label, reason },
            ChainError::Submit { label, reason } => Self::ConfirmationFailure {
                label,
                hash: None,
                reason,
            },
            ChainError::Receipt { hash, reason } => Self::ConfirmationFailure {
                label: "receipt".to_string(),
                hash: Some(hash),
                reason,
            },
            other => Self::ReadFailure(other),
        }
    }
}
