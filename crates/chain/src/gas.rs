//! Gas pricing for submitted transactions.
//!
//! Only the *price* is decided here. The gas *limit* always comes from the
//! caller (twice the pre-submission estimate) and is never touched.
//!
//! - Legacy: single `gas_price`, taken from `eth_gasPrice` and capped
//! - EIP-1559: `max_fee = base_fee * multiplier + priority_fee`, capped

use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionBuilder;
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use tracing::debug;

const GWEI: f64 = 1e9;

/// Fallback base fee when the latest block carries none (30 gwei).
const FALLBACK_BASE_FEE: u128 = 30_000_000_000;

/// Gas pricing strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum GasPricing {
    /// Pre-EIP-1559 pricing (Ronin and most sidechains).
    Legacy {
        /// Used when the node does not answer `eth_gasPrice` (wei)
        default_gas_price: u128,
        /// Upper bound (wei)
        max_gas_price: u128,
    },
    /// Base fee + priority fee pricing.
    Eip1559 {
        /// Used when the node does not suggest a priority fee (wei)
        default_priority_fee: u128,
        /// `max_fee_per_gas` multiplier applied to the base fee
        max_fee_multiplier: f64,
        /// Upper bound on `max_fee_per_gas` (wei)
        max_fee_cap: u128,
    },
}

impl GasPricing {
    /// Legacy pricing from gwei values.
    pub fn legacy_gwei(default_gas_price_gwei: f64, max_gas_price_gwei: f64) -> Self {
        Self::Legacy {
            default_gas_price: (default_gas_price_gwei * GWEI) as u128,
            max_gas_price: (max_gas_price_gwei * GWEI) as u128,
        }
    }

    /// EIP-1559 pricing from gwei values.
    pub fn eip1559_gwei(priority_fee_gwei: f64, max_fee_multiplier: f64, max_gas_price_gwei: f64) -> Self {
        Self::Eip1559 {
            default_priority_fee: (priority_fee_gwei * GWEI) as u128,
            max_fee_multiplier,
            max_fee_cap: (max_gas_price_gwei * GWEI) as u128,
        }
    }

    /// Strategy name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Legacy { .. } => "Legacy",
            Self::Eip1559 { .. } => "EIP-1559",
        }
    }

    /// Query current fee data and set the price fields on `tx`.
    pub async fn apply<P: Provider>(&self, provider: &P, tx: &mut TransactionRequest) -> Result<()> {
        match *self {
            Self::Legacy {
                default_gas_price,
                max_gas_price,
            } => {
                let observed = provider.get_gas_price().await.ok();
                let gas_price = legacy_price(observed, default_gas_price, max_gas_price);
                debug!(gas_price, "Applying legacy gas price");
                tx.set_gas_price(gas_price);
            }
            Self::Eip1559 {
                default_priority_fee,
                max_fee_multiplier,
                max_fee_cap,
            } => {
                let block = provider
                    .get_block_by_number(BlockNumberOrTag::Latest)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Failed to get latest block"))?;
                let base_fee = block
                    .header
                    .base_fee_per_gas
                    .map(|b| b as u128)
                    .unwrap_or(FALLBACK_BASE_FEE);
                let priority_fee = provider
                    .get_max_priority_fee_per_gas()
                    .await
                    .unwrap_or(default_priority_fee);
                let max_fee = eip1559_max_fee(base_fee, priority_fee, max_fee_multiplier, max_fee_cap);
                debug!(base_fee, priority_fee, max_fee, "Applying EIP-1559 fees");
                tx.set_max_fee_per_gas(max_fee);
                tx.set_max_priority_fee_per_gas(priority_fee.min(max_fee));
            }
        }
        Ok(())
    }
}

fn legacy_price(observed: Option<u128>, default_gas_price: u128, max_gas_price: u128) -> u128 {
    observed.unwrap_or(default_gas_price).min(max_gas_price)
}

fn eip1559_max_fee(base_fee: u128, priority_fee: u128, multiplier: f64, cap: u128) -> u128 {
    let max_fee = ((base_fee as f64) * multiplier) as u128 + priority_fee;
    max_fee.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_price_capped() {
        assert_eq!(legacy_price(Some(5), 1, 10), 5);
        assert_eq!(legacy_price(Some(20), 1, 10), 10);
        assert_eq!(legacy_price(None, 3, 10), 3);
    }

    #[test]
    fn test_eip1559_max_fee() {
        // 30 gwei base * 1.5 + 2 gwei tip = 47 gwei
        let fee = eip1559_max_fee(30_000_000_000, 2_000_000_000, 1.5, 500_000_000_000);
        assert_eq!(fee, 47_000_000_000);

        // Capped
        let fee = eip1559_max_fee(400_000_000_000, 2_000_000_000, 2.0, 500_000_000_000);
        assert_eq!(fee, 500_000_000_000);
    }

    #[test]
    fn test_gwei_constructors() {
        let legacy = GasPricing::legacy_gwei(20.0, 100.0);
        assert_eq!(
            legacy,
            GasPricing::Legacy {
                default_gas_price: 20_000_000_000,
                max_gas_price: 100_000_000_000,
            }
        );
        assert_eq!(legacy.name(), "Legacy");

        let eip1559 = GasPricing::eip1559_gwei(2.0, 1.5, 500.0);
        assert_eq!(eip1559.name(), "EIP-1559");
    }
}
