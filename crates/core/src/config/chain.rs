//! Chain section of a deployment file.

use farmer_chain::GasPricing;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[chain]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSection {
    /// Chain ID
    pub chain_id: u64,
    /// Human-readable name
    pub name: String,
    /// Native currency symbol (e.g., "RON", "ETH")
    pub native_symbol: String,
    /// Symbol of the wrapped native token used as the pricing hub (e.g., "WRON")
    pub hub_symbol: String,
    /// HTTP RPC endpoint, usually `${VAR}`
    pub rpc_url: String,
    /// Block time in milliseconds
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    /// Gas pricing
    #[serde(default)]
    pub gas: GasSection,
}

fn default_block_time_ms() -> u64 {
    3000
}

impl ChainSection {
    /// Get block time as Duration.
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }
}

/// `[chain.gas]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasSection {
    /// Gas pricing model
    #[serde(default)]
    pub pricing: GasPricingModel,
    /// Default gas price for legacy transactions (in gwei)
    #[serde(default = "default_gas_price")]
    pub default_gas_price_gwei: f64,
    /// Maximum gas price willing to pay (in gwei)
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price_gwei: f64,
    /// Priority fee for EIP-1559 transactions (in gwei)
    #[serde(default)]
    pub priority_fee_gwei: Option<f64>,
    /// Base fee multiplier for the EIP-1559 max fee
    #[serde(default = "default_max_fee_multiplier")]
    pub max_fee_multiplier: f64,
}

fn default_gas_price() -> f64 {
    20.0
}

fn default_max_gas_price() -> f64 {
    100.0
}

fn default_max_fee_multiplier() -> f64 {
    2.0
}

impl Default for GasSection {
    fn default() -> Self {
        Self {
            pricing: GasPricingModel::default(),
            default_gas_price_gwei: default_gas_price(),
            max_gas_price_gwei: default_max_gas_price(),
            priority_fee_gwei: None,
            max_fee_multiplier: default_max_fee_multiplier(),
        }
    }
}

impl GasSection {
    /// Build the submission-time pricing strategy.
    pub fn pricing(&self) -> GasPricing {
        match self.pricing {
            GasPricingModel::Legacy => {
                GasPricing::legacy_gwei(self.default_gas_price_gwei, self.max_gas_price_gwei)
            }
            GasPricingModel::Eip1559 => GasPricing::eip1559_gwei(
                self.priority_fee_gwei.unwrap_or(1.0),
                self.max_fee_multiplier,
                self.max_gas_price_gwei,
            ),
        }
    }
}

/// Gas pricing model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasPricingModel {
    /// Legacy gas pricing (gas price only)
    #[default]
    Legacy,
    /// EIP-1559 (base fee + priority fee)
    Eip1559,
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
///
/// Unset variables are left in place; callers that need a value reject the
/// unexpanded reference.
pub(crate) fn expand_env(s: &str) -> anyhow::Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")?;
    let mut result = s.to_string();

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    Ok(result)
}

/// Expand `s` and fail if any reference stayed unresolved.
pub(crate) fn expand_env_required(s: &str, what: &str) -> anyhow::Result<String> {
    let expanded = expand_env(s)?;
    if expanded.contains("${") {
        anyhow::bail!("{what}: environment variable in `{s}` is not set");
    }
    Ok(expanded)
}
