//! Alloy-backed implementation of the chain-access port.
//!
//! Reads go through a plain HTTP provider; submissions go through a provider
//! carrying the wallet of the calling account. Confirmation waits poll
//! `eth_getTransactionReceipt` once per block interval until the receipt
//! appears. There is deliberately no client-side timeout on that wait.

use crate::access::{
    AccountRole, ChainAccess, ChainError, ChainResult, ContractCall, PairReserves, TokenMetadata,
    TxReceipt,
};
use crate::contracts::{IERC20, IPair, IStakingPool};
use crate::gas::GasPricing;
use crate::signer::AccountSigners;
use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chain access over JSON-RPC.
pub struct RpcChain {
    /// HTTP RPC endpoint
    rpc_url: String,
    /// Expected chain ID
    chain_id: u64,
    /// Account signers
    signers: AccountSigners,
    /// Gas pricing strategy
    gas: GasPricing,
    /// Receipt polling interval (one block)
    poll_interval: Duration,
}

impl RpcChain {
    /// Connect and verify the endpoint serves the expected chain.
    pub async fn connect(
        rpc_url: &str,
        chain_id: u64,
        signers: AccountSigners,
        gas: GasPricing,
        poll_interval: Duration,
    ) -> ChainResult<Self> {
        let chain = Self {
            rpc_url: rpc_url.to_string(),
            chain_id,
            signers,
            gas,
            poll_interval,
        };

        let provider = ProviderBuilder::new().on_http(chain.url()?);
        let remote_chain_id = provider.get_chain_id().await.map_err(|e| ChainError::Endpoint {
            url: chain.rpc_url.clone(),
            reason: e.to_string(),
        })?;
        chain.check_chain_id(remote_chain_id)?;

        info!(
            chain_id = remote_chain_id,
            accounts = chain.signers.len(),
            gas_strategy = chain.gas.name(),
            "Chain access initialized"
        );

        Ok(chain)
    }

    /// Reject an endpoint serving a different chain than configured.
    fn check_chain_id(&self, remote_chain_id: u64) -> ChainResult<()> {
        if remote_chain_id == self.chain_id {
            return Ok(());
        }
        warn!(
            expected = self.chain_id,
            actual = remote_chain_id,
            "RPC endpoint reports a different chain ID"
        );
        Err(ChainError::Endpoint {
            url: self.rpc_url.clone(),
            reason: format!("expected chain ID {}, endpoint reports {remote_chain_id}", self.chain_id),
        })
    }

    fn url(&self) -> ChainResult<Url> {
        self.rpc_url.parse::<Url>().map_err(|e| ChainError::Endpoint {
            url: self.rpc_url.clone(),
            reason: e.to_string(),
        })
    }

    fn request_for(&self, from: Address, call: &ContractCall) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(from)
            .with_to(call.to)
            .with_input(call.input.clone())
            .with_value(call.value)
    }
}

#[async_trait]
impl ChainAccess for RpcChain {
    async fn address_of(&self, account: &AccountRole) -> ChainResult<Address> {
        self.signers.address_of(account)
    }

    async fn native_balance(&self, owner: Address) -> ChainResult<U256> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        provider
            .get_balance(owner)
            .await
            .map_err(|e| ChainError::read(format!("native balance of {owner}"), e))
    }

    async fn token_metadata(&self, token: Address) -> ChainResult<TokenMetadata> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IERC20::new(token, &provider);

        let symbol_call = contract.symbol();
        let decimals_call = contract.decimals();
        let (symbol, decimals) = tokio::join!(symbol_call.call(), decimals_call.call());

        Ok(TokenMetadata {
            address: token,
            symbol: symbol
                .map_err(|e| ChainError::read(format!("symbol of {token}"), e))?
                ._0,
            decimals: decimals
                .map_err(|e| ChainError::read(format!("decimals of {token}"), e))?
                ._0,
        })
    }

    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IERC20::new(token, &provider);
        contract
            .balanceOf(owner)
            .call()
            .await
            .map(|r| r._0)
            .map_err(|e| ChainError::read(format!("balanceOf({owner}) at {token}"), e))
    }

    async fn token_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> ChainResult<U256> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IERC20::new(token, &provider);
        contract
            .allowance(owner, spender)
            .call()
            .await
            .map(|r| r._0)
            .map_err(|e| ChainError::read(format!("allowance({owner}, {spender}) at {token}"), e))
    }

    async fn total_supply(&self, token: Address) -> ChainResult<U256> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IERC20::new(token, &provider);
        contract
            .totalSupply()
            .call()
            .await
            .map(|r| r._0)
            .map_err(|e| ChainError::read(format!("totalSupply at {token}"), e))
    }

    async fn pair_tokens(&self, pair: Address) -> ChainResult<(Address, Address)> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IPair::new(pair, &provider);

        let token0_call = contract.token0();
        let token1_call = contract.token1();
        let (token0, token1) = tokio::join!(token0_call.call(), token1_call.call());

        Ok((
            token0
                .map_err(|e| ChainError::read(format!("token0 of {pair}"), e))?
                ._0,
            token1
                .map_err(|e| ChainError::read(format!("token1 of {pair}"), e))?
                ._0,
        ))
    }

    async fn pair_reserves(&self, pair: Address) -> ChainResult<PairReserves> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IPair::new(pair, &provider);
        let reserves = contract
            .getReserves()
            .call()
            .await
            .map_err(|e| ChainError::read(format!("getReserves of {pair}"), e))?;

        Ok(PairReserves {
            reserve0: U256::from(reserves._reserve0),
            reserve1: U256::from(reserves._reserve1),
            timestamp: u64::from(reserves._blockTimestampLast),
        })
    }

    async fn pending_rewards(&self, staking: Address, owner: Address) -> ChainResult<U256> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IStakingPool::new(staking, &provider);
        contract
            .getPendingRewards(owner)
            .call()
            .await
            .map(|r| r._0)
            .map_err(|e| ChainError::read(format!("getPendingRewards({owner}) at {staking}"), e))
    }

    async fn staking_amount(&self, staking: Address, owner: Address) -> ChainResult<U256> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IStakingPool::new(staking, &provider);
        contract
            .getStakingAmount(owner)
            .call()
            .await
            .map(|r| r._0)
            .map_err(|e| ChainError::read(format!("getStakingAmount({owner}) at {staking}"), e))
    }

    async fn block_timestamp(&self) -> ChainResult<u64> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let block = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| ChainError::read("latest block", e))?
            .ok_or_else(|| ChainError::read("latest block", "node returned no block"))?;
        Ok(block.header.timestamp)
    }

    async fn estimate_gas(&self, call: &ContractCall) -> ChainResult<u64> {
        let from = self.signers.address_of(&call.from)?;
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let tx = self.request_for(from, call);

        let gas = provider
            .estimate_gas(tx)
            .await
            .map_err(|e| ChainError::estimate(&call.label, e))?;

        debug!(label = %call.label, from = %from, gas, "Gas estimated");
        Ok(gas)
    }

    async fn submit(&self, call: &ContractCall, gas_limit: u64) -> ChainResult<TxHash> {
        let from = self.signers.address_of(&call.from)?;
        let wallet = self.signers.wallet(&call.from)?;
        let provider = ProviderBuilder::new().wallet(wallet).on_http(self.url()?);

        let mut tx = self
            .request_for(from, call)
            .with_gas_limit(gas_limit)
            .with_chain_id(self.chain_id);
        self.gas
            .apply(&provider, &mut tx)
            .await
            .map_err(|e| ChainError::submit(&call.label, e))?;

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::submit(&call.label, e))?;
        let tx_hash = *pending.tx_hash();

        info!(
            label = %call.label,
            from = %from,
            to = %call.to,
            value = %call.value,
            gas_limit,
            tx_hash = %tx_hash,
            "Transaction submitted, waiting for confirmation"
        );

        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> ChainResult<TxReceipt> {
        let provider = ProviderBuilder::new().on_http(self.url()?);

        loop {
            let receipt = provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| ChainError::Receipt {
                    hash,
                    reason: e.to_string(),
                })?;

            if let Some(receipt) = receipt {
                let result = TxReceipt {
                    hash,
                    success: receipt.status(),
                    block_number: receipt.block_number,
                    gas_used: receipt.gas_used,
                };
                debug!(
                    tx_hash = %hash,
                    success = result.success,
                    block = result.block_number.unwrap_or(0),
                    gas_used = result.gas_used,
                    "Receipt received"
                );
                return Ok(result);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl std::fmt::Debug for RpcChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChain")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("signers", &self.signers)
            .field("gas", &self.gas.name())
            .finish_non_exhaustive()
    }
}
