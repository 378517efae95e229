//! Slippage-bounded, gas-safe execution of single state-changing calls.
//!
//! Every submission goes through [`Executor::submit`]: estimate, submit with
//! exactly twice the estimate, then block until the receipt arrives. Swaps
//! and deposits additionally read fresh reserves and balances, enforce the
//! native floor and bound the counterparty with a minimum output and a
//! deadline derived from the pair's own timestamp.

use crate::amm::{get_amount_out, min_acceptable, quote};
use crate::config::Deployment;
use crate::error::{FarmError, FarmResult};
use crate::units::format_units;
use alloy::primitives::{Address, U256};
use farmer_chain::contracts::IERC20;
use farmer_chain::{AccountRole, ChainAccess, ContractCall, RouterFlavor, TxReceipt};
use tracing::{debug, info, instrument};

/// Gas allowance multiplier over the pre-submission estimate.
pub const GAS_LIMIT_MULTIPLIER: u64 = 2;

/// Native currency precision.
const NATIVE_DECIMALS: u8 = 18;

/// Parameters for swaps and deposits.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub router: Address,
    pub router_flavor: RouterFlavor,
    /// Wrapped native token, the native side of every pair
    pub hub_token: Address,
    pub native_symbol: String,
    /// Native balance never spent
    pub native_floor: U256,
    pub slippage_bps: u16,
    pub deadline_window_secs: u64,
    pub fee_bps: u16,
}

impl ExecutorSettings {
    pub fn from_deployment(deployment: &Deployment) -> Self {
        Self {
            router: deployment.contracts.router,
            router_flavor: deployment.contracts.router_flavor,
            hub_token: deployment.contracts.hub_token,
            native_symbol: deployment.chain.native_symbol.clone(),
            native_floor: deployment.native_floor,
            slippage_bps: deployment.sweep.slippage_bps,
            deadline_window_secs: deployment.sweep.deadline_window_secs,
            fee_bps: deployment.sweep.fee_bps,
        }
    }
}

/// A confirmed, successful transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
    pub label: String,
    pub gas_limit: u64,
    pub receipt: TxReceipt,
}

/// Pair reserves oriented as native side / paired side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairState {
    pub pair: Address,
    pub paired_token: Address,
    pub paired_symbol: String,
    pub paired_decimals: u8,
    pub reserve_native: U256,
    pub reserve_paired: U256,
    /// Pair's last reserve update, basis of the deadline
    pub timestamp: u64,
}

/// Native-for-token swap, fully priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    pub recipient: Address,
    pub amount_in: U256,
    pub expected_out: U256,
    pub min_out: U256,
    pub path: Vec<Address>,
    pub deadline: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    pub plan: SwapPlan,
    pub confirmed: Confirmed,
}

/// Native + paired-token liquidity deposit, fully priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositPlan {
    pub recipient: Address,
    pub paired_token: Address,
    pub paired_amount: U256,
    pub paired_min: U256,
    pub native_amount: U256,
    pub native_min: U256,
    pub deadline: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositOutcome {
    pub plan: DepositPlan,
    pub approval: Option<Confirmed>,
    pub confirmed: Confirmed,
}

/// Half of the surplus above `floor`.
///
/// Fails when the balance does not exceed the floor.
pub fn sell_amount(balance: U256, floor: U256, symbol: &str) -> FarmResult<U256> {
    if balance <= floor {
        return Err(FarmError::insufficient(symbol, balance, floor));
    }
    Ok((balance - floor) / U256::from(2u64))
}

/// Executes one state-changing operation at a time.
pub struct Executor<'a> {
    chain: &'a dyn ChainAccess,
    settings: ExecutorSettings,
}

impl<'a> Executor<'a> {
    pub fn new(chain: &'a dyn ChainAccess, settings: ExecutorSettings) -> Self {
        Self { chain, settings }
    }

    /// Estimate, submit with twice the estimate, and wait for the receipt.
    #[instrument(skip_all, fields(label = %call.label, from = %call.from))]
    pub async fn submit(&self, call: ContractCall) -> FarmResult<Confirmed> {
        let estimate = self
            .chain
            .estimate_gas(&call)
            .await
            .map_err(|e| FarmError::EstimationFailure {
                label: call.label.clone(),
                reason: e.to_string(),
            })?;
        let gas_limit = estimate.checked_mul(GAS_LIMIT_MULTIPLIER).ok_or_else(|| {
            FarmError::EstimationFailure {
                label: call.label.clone(),
                reason: format!("estimate {estimate} overflows the gas limit"),
            }
        })?;

        debug!(estimate, gas_limit, to = %call.to, value = %call.value, "Submitting");

        let hash = self
            .chain
            .submit(&call, gas_limit)
            .await
            .map_err(|e| FarmError::confirmation(&call.label, None, e))?;
        let receipt = self
            .chain
            .wait_for_receipt(hash)
            .await
            .map_err(|e| FarmError::confirmation(&call.label, Some(hash), e))?;

        if !receipt.success {
            return Err(FarmError::ConfirmationFailure {
                label: call.label,
                hash: Some(hash),
                reason: "transaction reverted".to_string(),
            });
        }

        info!(
            tx_hash = %hash,
            block = receipt.block_number.unwrap_or(0),
            gas_used = receipt.gas_used,
            gas_limit,
            "Transaction confirmed"
        );

        Ok(Confirmed {
            label: call.label,
            gas_limit,
            receipt,
        })
    }

    /// Approve `spender` for the maximum amount when the allowance is below `amount`.
    pub async fn ensure_allowance(
        &self,
        account: &AccountRole,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> FarmResult<Option<Confirmed>> {
        let owner = self.chain.address_of(account).await?;
        let allowance = self.chain.token_allowance(token, owner, spender).await?;
        if allowance >= amount {
            return Ok(None);
        }

        info!(account = %account, token = %token, spender = %spender, "Approving spender");
        let call = ContractCall::encode(
            account.clone(),
            token,
            &IERC20::approveCall {
                spender,
                amount: U256::MAX,
            },
        );
        self.submit(call).await.map(Some)
    }

    /// Read `pair` and orient its reserves around the hub token.
    pub async fn pair_state(&self, pair: Address) -> FarmResult<PairState> {
        let ((token0, token1), reserves) =
            tokio::try_join!(self.chain.pair_tokens(pair), self.chain.pair_reserves(pair))?;

        let hub = self.settings.hub_token;
        let (paired_token, reserve_native, reserve_paired) = if token0 == hub {
            (token1, reserves.reserve0, reserves.reserve1)
        } else if token1 == hub {
            (token0, reserves.reserve1, reserves.reserve0)
        } else {
            return Err(FarmError::Config(format!(
                "pair {pair} does not contain the hub token {hub}"
            )));
        };

        let paired = self.chain.token_metadata(paired_token).await?;
        Ok(PairState {
            pair,
            paired_token,
            paired_symbol: paired.symbol,
            paired_decimals: paired.decimals,
            reserve_native,
            reserve_paired,
            timestamp: reserves.timestamp,
        })
    }

    fn deadline(&self, state: &PairState) -> u64 {
        state.timestamp.saturating_add(self.settings.deadline_window_secs)
    }

    /// Price a sale of half the native surplus of `account` into `pair`.
    pub async fn plan_sell(&self, account: &AccountRole, pair: Address) -> FarmResult<SwapPlan> {
        let recipient = self.chain.address_of(account).await?;
        let (balance, state) =
            tokio::try_join!(
                async { Ok::<_, FarmError>(self.chain.native_balance(recipient).await?) },
                self.pair_state(pair),
            )?;

        let amount_in = sell_amount(balance, self.settings.native_floor, &self.settings.native_symbol)?;
        if amount_in.is_zero() {
            return Err(FarmError::insufficient(
                &self.settings.native_symbol,
                balance,
                self.settings.native_floor,
            ));
        }

        let expected_out = get_amount_out(
            amount_in,
            state.reserve_native,
            state.reserve_paired,
            self.settings.fee_bps,
        )
        .ok_or_else(|| FarmError::Config(format!("pair {pair} has no liquidity")))?;

        Ok(SwapPlan {
            recipient,
            amount_in,
            expected_out,
            min_out: min_acceptable(expected_out, self.settings.slippage_bps),
            path: vec![self.settings.hub_token, state.paired_token],
            deadline: self.deadline(&state),
        })
    }

    /// Sell half the native surplus of `account` for the paired token of `pair`.
    #[instrument(skip_all, fields(account = %account, pair = %pair))]
    pub async fn sell_native_surplus(
        &self,
        account: &AccountRole,
        pair: Address,
    ) -> FarmResult<SwapOutcome> {
        let plan = self.plan_sell(account, pair).await?;

        info!(
            amount_in = %format_units(plan.amount_in, NATIVE_DECIMALS),
            expected_out = %plan.expected_out,
            min_out = %plan.min_out,
            deadline = plan.deadline,
            "Selling native surplus"
        );

        let (input, label) = self.settings.router_flavor.encode_swap_exact_native(
            plan.min_out,
            plan.path.clone(),
            plan.recipient,
            U256::from(plan.deadline),
        );
        let call = ContractCall {
            from: account.clone(),
            to: self.settings.router,
            input,
            value: plan.amount_in,
            label: label.to_string(),
        };

        let confirmed = self.submit(call).await?;
        Ok(SwapOutcome { plan, confirmed })
    }

    /// Price a deposit of the full paired balance plus the matching native amount.
    ///
    /// When the matching native amount would cut into the floor it is capped
    /// at the spendable surplus and the paired amount is re-derived from it.
    pub async fn plan_deposit(&self, account: &AccountRole, pair: Address) -> FarmResult<DepositPlan> {
        let recipient = self.chain.address_of(account).await?;
        let state = self.pair_state(pair).await?;
        let (balance, paired_balance) = tokio::try_join!(
            self.chain.native_balance(recipient),
            self.chain.token_balance(state.paired_token, recipient),
        )?;

        let floor = self.settings.native_floor;
        if balance <= floor {
            return Err(FarmError::insufficient(&self.settings.native_symbol, balance, floor));
        }
        if paired_balance.is_zero() {
            return Err(FarmError::insufficient(&state.paired_symbol, paired_balance, U256::ZERO));
        }

        let no_liquidity = || FarmError::Config(format!("pair {pair} has no liquidity"));
        let spendable = balance - floor;
        let mut paired_amount = paired_balance;
        let mut native_amount =
            quote(paired_amount, state.reserve_paired, state.reserve_native).ok_or_else(no_liquidity)?;
        if native_amount > spendable {
            native_amount = spendable;
            paired_amount =
                quote(native_amount, state.reserve_native, state.reserve_paired).ok_or_else(no_liquidity)?;
        }
        if native_amount.is_zero() || paired_amount.is_zero() {
            return Err(FarmError::insufficient(&self.settings.native_symbol, balance, floor));
        }

        Ok(DepositPlan {
            recipient,
            paired_token: state.paired_token,
            paired_amount,
            paired_min: min_acceptable(paired_amount, self.settings.slippage_bps),
            native_amount,
            native_min: min_acceptable(native_amount, self.settings.slippage_bps),
            deadline: self.deadline(&state),
        })
    }

    /// Deposit the paired balance of `account` with matching native currency into `pair`.
    #[instrument(skip_all, fields(account = %account, pair = %pair))]
    pub async fn add_native_liquidity(
        &self,
        account: &AccountRole,
        pair: Address,
    ) -> FarmResult<DepositOutcome> {
        let plan = self.plan_deposit(account, pair).await?;

        info!(
            native = %format_units(plan.native_amount, NATIVE_DECIMALS),
            native_min = %format_units(plan.native_min, NATIVE_DECIMALS),
            paired = %plan.paired_amount,
            paired_min = %plan.paired_min,
            deadline = plan.deadline,
            "Adding liquidity"
        );

        let approval = self
            .ensure_allowance(account, plan.paired_token, self.settings.router, plan.paired_amount)
            .await?;

        let (input, label) = self.settings.router_flavor.encode_add_liquidity_native(
            plan.paired_token,
            plan.paired_amount,
            plan.paired_min,
            plan.native_min,
            plan.recipient,
            U256::from(plan.deadline),
        );
        let call = ContractCall {
            from: account.clone(),
            to: self.settings.router,
            input,
            value: plan.native_amount,
            label: label.to_string(),
        };

        let confirmed = self.submit(call).await?;
        Ok(DepositOutcome {
            plan,
            approval,
            confirmed,
        })
    }
}
