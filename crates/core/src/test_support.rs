//! Deterministic in-memory chain used by the core tests.
//!
//! State-changing calls are decoded and applied to the in-memory balances so
//! that multi-step pipelines observe the effects of earlier steps.

use crate::config::{sample_toml, Deployment, DeploymentFile};
use crate::executor::{Executor, ExecutorSettings};
use alloy::primitives::{address, Address, TxHash, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use farmer_chain::contracts::{IERC20, IKatanaRouter, IStakingPool, IUniswapV2Router};
use farmer_chain::{
    AccountRole, ChainAccess, ChainError, ChainResult, ContractCall, PairReserves, TokenMetadata,
    TxReceipt,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Default)]
struct MockState {
    accounts: BTreeMap<AccountRole, Address>,
    native: HashMap<Address, U256>,
    tokens: HashMap<Address, TokenMetadata>,
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    supply: HashMap<Address, U256>,
    pairs: HashMap<Address, (Address, Address, PairReserves)>,
    pending: HashMap<(Address, Address), U256>,
    staked: HashMap<(Address, Address), U256>,
    /// Token each staking contract pays out; `None` pays native currency.
    reward_asset: HashMap<Address, Option<Address>>,
    /// Token each staking contract accepts in `stake`.
    stake_token: HashMap<Address, Address>,
    /// LP token and amount minted by a router deposit.
    liquidity_mint: Option<(Address, U256)>,
    timestamp: u64,
    failing_reads: HashSet<Address>,
    failing_estimates: HashSet<String>,
    failing_submits: HashSet<String>,
    reverting: HashSet<String>,
    estimates: Vec<ContractCall>,
    submissions: Vec<(ContractCall, u64)>,
    receipts: HashMap<TxHash, bool>,
}

/// Recorded submission.
#[derive(Debug, Clone)]
pub(crate) struct Submitted {
    pub call: ContractCall,
    pub gas_limit: u64,
}

#[derive(Default)]
pub(crate) struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        let chain = Self::default();
        chain.state.lock().timestamp = 1_700_000_000;
        chain
    }

    /// Gas the mock reports for `call`; varies with calldata size.
    pub fn gas_for(call: &ContractCall) -> u64 {
        21_000 + 16 * call.input.len() as u64
    }

    pub fn add_account(&self, role: &str, address: Address) {
        self.state.lock().accounts.insert(AccountRole::new(role), address);
    }

    pub fn set_native(&self, owner: Address, amount: U256) {
        self.state.lock().native.insert(owner, amount);
    }

    pub fn add_token(&self, token: Address, symbol: &str, decimals: u8) {
        self.state.lock().tokens.insert(
            token,
            TokenMetadata {
                address: token,
                symbol: symbol.to_string(),
                decimals,
            },
        );
    }

    pub fn set_balance(&self, token: Address, owner: Address, amount: U256) {
        self.state.lock().balances.insert((token, owner), amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.state
            .lock()
            .allowances
            .insert((token, owner, spender), amount);
    }

    pub fn set_supply(&self, token: Address, amount: U256) {
        self.state.lock().supply.insert(token, amount);
    }

    pub fn add_pair(&self, pair: Address, token0: Address, token1: Address, r0: U256, r1: U256) {
        let mut state = self.state.lock();
        let timestamp = state.timestamp;
        state.pairs.insert(
            pair,
            (
                token0,
                token1,
                PairReserves {
                    reserve0: r0,
                    reserve1: r1,
                    timestamp,
                },
            ),
        );
    }

    pub fn set_pending(&self, staking: Address, owner: Address, amount: U256) {
        self.state.lock().pending.insert((staking, owner), amount);
    }

    pub fn set_staked(&self, staking: Address, owner: Address, amount: U256) {
        self.state.lock().staked.insert((staking, owner), amount);
    }

    /// Configure what a staking contract pays out and accepts.
    pub fn configure_staking(&self, staking: Address, reward: Option<Address>, stake: Address) {
        let mut state = self.state.lock();
        state.reward_asset.insert(staking, reward);
        state.stake_token.insert(staking, stake);
    }

    pub fn set_liquidity_mint(&self, lp_token: Address, amount: U256) {
        self.state.lock().liquidity_mint = Some((lp_token, amount));
    }

    pub fn fail_reads_for(&self, address: Address) {
        self.state.lock().failing_reads.insert(address);
    }

    /// Make estimation fail for calls whose label starts with `label`.
    pub fn fail_estimate(&self, label: &str) {
        self.state.lock().failing_estimates.insert(label.to_string());
    }

    /// Make the node reject submission of calls whose label starts with `label`.
    pub fn fail_submit(&self, label: &str) {
        self.state.lock().failing_submits.insert(label.to_string());
    }

    /// Make calls whose label starts with `label` revert on-chain.
    pub fn revert_on(&self, label: &str) {
        self.state.lock().reverting.insert(label.to_string());
    }

    pub fn submissions(&self) -> Vec<Submitted> {
        self.state
            .lock()
            .submissions
            .iter()
            .map(|(call, gas_limit)| Submitted {
                call: call.clone(),
                gas_limit: *gas_limit,
            })
            .collect()
    }

    pub fn submitted_labels(&self) -> Vec<String> {
        self.state
            .lock()
            .submissions
            .iter()
            .map(|(call, _)| call.label.clone())
            .collect()
    }

    pub fn estimate_count(&self) -> usize {
        self.state.lock().estimates.len()
    }

    pub fn native_of(&self, owner: Address) -> U256 {
        self.state.lock().native.get(&owner).copied().unwrap_or_default()
    }

    pub fn balance_of(&self, token: Address, owner: Address) -> U256 {
        self.state
            .lock()
            .balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    pub fn staked_of(&self, staking: Address, owner: Address) -> U256 {
        self.state
            .lock()
            .staked
            .get(&(staking, owner))
            .copied()
            .unwrap_or_default()
    }

    fn check_read(state: &MockState, address: Address, what: &str) -> ChainResult<()> {
        if state.failing_reads.contains(&address) {
            return Err(ChainError::read(format!("{what} at {address}"), "injected failure"));
        }
        Ok(())
    }
}

fn matches_label(set: &HashSet<String>, label: &str) -> bool {
    set.iter().any(|prefix| label.starts_with(prefix.as_str()))
}

impl MockState {
    fn address_of(&self, role: &AccountRole) -> ChainResult<Address> {
        self.accounts
            .get(role)
            .copied()
            .ok_or_else(|| ChainError::UnknownAccount(role.to_string()))
    }

    fn debit(&mut self, token: Address, owner: Address, amount: U256) {
        let entry = self.balances.entry((token, owner)).or_default();
        *entry = entry.saturating_sub(amount);
    }

    fn credit(&mut self, token: Address, owner: Address, amount: U256) {
        *self.balances.entry((token, owner)).or_default() += amount;
    }

    fn credit_reward(&mut self, staking: Address, owner: Address, amount: U256) {
        match self.reward_asset.get(&staking).copied().flatten() {
            Some(token) => self.credit(token, owner, amount),
            None => *self.native.entry(owner).or_default() += amount,
        }
    }

    /// Apply the effect of a successful call.
    fn apply(&mut self, from: Address, call: &ContractCall) {
        let native = self.native.entry(from).or_default();
        *native = native.saturating_sub(call.value);
        let data = call.input.as_ref();

        let Some(selector) = call.selector() else {
            *self.native.entry(call.to).or_default() += call.value;
            return;
        };

        if selector == IStakingPool::claimPendingRewardsCall::SELECTOR {
            let pending = self.pending.remove(&(call.to, from)).unwrap_or_default();
            self.credit_reward(call.to, from, pending);
        } else if selector == IStakingPool::restakeRewardsCall::SELECTOR {
            let pending = self.pending.remove(&(call.to, from)).unwrap_or_default();
            *self.staked.entry((call.to, from)).or_default() += pending;
        } else if let Ok(stake) = IStakingPool::stakeCall::abi_decode(data, true) {
            if let Some(token) = self.stake_token.get(&call.to).copied() {
                self.debit(token, from, stake.amount);
            }
            *self.staked.entry((call.to, from)).or_default() += stake.amount;
        } else if let Ok(transfer) = IERC20::transferCall::abi_decode(data, true) {
            self.debit(call.to, from, transfer.amount);
            self.credit(call.to, transfer.to, transfer.amount);
        } else if let Ok(approve) = IERC20::approveCall::abi_decode(data, true) {
            self.allowances
                .insert((call.to, from, approve.spender), approve.amount);
        } else if let Ok(swap) = IKatanaRouter::swapExactRONForTokensCall::abi_decode(data, true) {
            if let Some(out) = swap.path.last() {
                self.credit(*out, swap.to, swap.amountOutMin);
            }
        } else if let Ok(swap) = IUniswapV2Router::swapExactETHForTokensCall::abi_decode(data, true)
        {
            if let Some(out) = swap.path.last() {
                self.credit(*out, swap.to, swap.amountOutMin);
            }
        } else if let Ok(add) = IKatanaRouter::addLiquidityRONCall::abi_decode(data, true) {
            self.deposit(from, add.token, add.amountTokenDesired, add.to);
        } else if let Ok(add) = IUniswapV2Router::addLiquidityETHCall::abi_decode(data, true) {
            self.deposit(from, add.token, add.amountTokenDesired, add.to);
        }
    }

    fn deposit(&mut self, from: Address, token: Address, amount: U256, to: Address) {
        self.debit(token, from, amount);
        if let Some((lp, minted)) = self.liquidity_mint {
            self.credit(lp, to, minted);
        }
    }
}

#[async_trait]
impl ChainAccess for MockChain {
    async fn address_of(&self, account: &AccountRole) -> ChainResult<Address> {
        self.state.lock().address_of(account)
    }

    async fn native_balance(&self, owner: Address) -> ChainResult<U256> {
        let state = self.state.lock();
        Self::check_read(&state, owner, "native balance")?;
        Ok(state.native.get(&owner).copied().unwrap_or_default())
    }

    async fn token_metadata(&self, token: Address) -> ChainResult<TokenMetadata> {
        let state = self.state.lock();
        Self::check_read(&state, token, "metadata")?;
        state
            .tokens
            .get(&token)
            .cloned()
            .ok_or_else(|| ChainError::read(format!("metadata of {token}"), "not a token"))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256> {
        let state = self.state.lock();
        Self::check_read(&state, token, "balanceOf")?;
        Ok(state.balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn token_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> ChainResult<U256> {
        let state = self.state.lock();
        Self::check_read(&state, token, "allowance")?;
        Ok(state
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn total_supply(&self, token: Address) -> ChainResult<U256> {
        let state = self.state.lock();
        Self::check_read(&state, token, "totalSupply")?;
        Ok(state.supply.get(&token).copied().unwrap_or_default())
    }

    async fn pair_tokens(&self, pair: Address) -> ChainResult<(Address, Address)> {
        let state = self.state.lock();
        Self::check_read(&state, pair, "pair tokens")?;
        state
            .pairs
            .get(&pair)
            .map(|(t0, t1, _)| (*t0, *t1))
            .ok_or_else(|| ChainError::read(format!("token0 of {pair}"), "not a pair"))
    }

    async fn pair_reserves(&self, pair: Address) -> ChainResult<PairReserves> {
        let state = self.state.lock();
        Self::check_read(&state, pair, "getReserves")?;
        state
            .pairs
            .get(&pair)
            .map(|(_, _, reserves)| *reserves)
            .ok_or_else(|| ChainError::read(format!("getReserves of {pair}"), "not a pair"))
    }

    async fn pending_rewards(&self, staking: Address, owner: Address) -> ChainResult<U256> {
        let state = self.state.lock();
        Self::check_read(&state, staking, "getPendingRewards")?;
        Ok(state.pending.get(&(staking, owner)).copied().unwrap_or_default())
    }

    async fn staking_amount(&self, staking: Address, owner: Address) -> ChainResult<U256> {
        let state = self.state.lock();
        Self::check_read(&state, staking, "getStakingAmount")?;
        Ok(state.staked.get(&(staking, owner)).copied().unwrap_or_default())
    }

    async fn block_timestamp(&self) -> ChainResult<u64> {
        Ok(self.state.lock().timestamp)
    }

    async fn estimate_gas(&self, call: &ContractCall) -> ChainResult<u64> {
        let mut state = self.state.lock();
        state.estimates.push(call.clone());
        state.address_of(&call.from)?;
        if matches_label(&state.failing_estimates, &call.label) {
            return Err(ChainError::estimate(&call.label, "execution reverted"));
        }
        Ok(Self::gas_for(call))
    }

    async fn submit(&self, call: &ContractCall, gas_limit: u64) -> ChainResult<TxHash> {
        let mut state = self.state.lock();
        let from = state.address_of(&call.from)?;
        if matches_label(&state.failing_submits, &call.label) {
            return Err(ChainError::submit(&call.label, "nonce too low"));
        }
        state.submissions.push((call.clone(), gas_limit));
        let hash = TxHash::with_last_byte(state.submissions.len() as u8);

        let success = !matches_label(&state.reverting, &call.label);
        if success {
            state.apply(from, call);
        }
        state.receipts.insert(hash, success);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> ChainResult<TxReceipt> {
        let state = self.state.lock();
        let success = state.receipts.get(&hash).copied().ok_or(ChainError::Receipt {
            hash,
            reason: "unknown transaction".to_string(),
        })?;
        Ok(TxReceipt {
            hash,
            success,
            block_number: Some(state.submissions.len() as u64),
            gas_used: 21_000,
        })
    }
}

pub(crate) const MAIN: Address = address!("00000000000000000000000000000000000000aa");
pub(crate) const GENESIS: Address = address!("00000000000000000000000000000000000000bb");

pub(crate) const ROUTER: Address = address!("7d0556d55ca1a92708681e2e231733ebd922597d");
pub(crate) const WRON: Address = address!("e514d9deb7966c8be0ca922de8a064264ea6bcd4");
pub(crate) const AXS: Address = address!("97a9107c1793bc407d6f527b77e7fff4d812bece");
pub(crate) const WETH: Address = address!("c99a6a985ed2cac1ef41640596c5a5f9f4e19ef5");
pub(crate) const USDC: Address = address!("0b7007c13325c48911f73a2dad5fa5dcbf808adc");
pub(crate) const AXS_STAKING: Address = address!("05b0bb3c1c320b280501b86706c3551995bc8571");
pub(crate) const LAND_STAKING: Address = address!("b2a5110f163ec592f8f0d4207253d8cbc327d9fb");
pub(crate) const RON_USDC: Address = address!("4f7687affc10857fccd0938ecda0947de7ad3812");
pub(crate) const RON_AXS: Address = address!("32d1dbb6a4275133cc49f1c61653be3998ada4ff");
pub(crate) const RON_WETH: Address = address!("2ecb08f87f075b5769fe543d0e52e40140575ea7");
pub(crate) const LP_STAKING: Address = address!("b9072cec557528f81dd25dc474d4d69564956e1e");

pub(crate) fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(18u64))
}

pub(crate) fn usdc(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000u64)
}

/// The sample deployment wired to a seeded mock chain.
///
/// Prices: 1 RON = 0.5 USDC, 1 AXS = 10 RON, 1 WETH = 2000 RON.
pub(crate) struct Fixture {
    pub chain: MockChain,
    pub deployment: Deployment,
}

impl Fixture {
    pub fn new() -> Self {
        let deployment = Deployment::resolve(DeploymentFile::parse(&sample_toml()).unwrap()).unwrap();
        let chain = MockChain::new();

        chain.add_account("main", MAIN);
        chain.add_account("genesis", GENESIS);
        chain.set_native(MAIN, ether(1000));
        chain.set_native(GENESIS, ether(2));

        chain.add_token(WRON, "WRON", 18);
        chain.add_token(AXS, "AXS", 18);
        chain.add_token(WETH, "WETH", 18);
        chain.add_token(USDC, "USDC", 6);

        chain.add_pair(RON_USDC, USDC, WRON, usdc(500_000), ether(1_000_000));
        chain.add_pair(RON_AXS, WRON, AXS, ether(100_000), ether(10_000));
        chain.add_pair(RON_WETH, WRON, WETH, ether(1_000_000), ether(500));
        chain.set_supply(RON_WETH, ether(1000));

        chain.configure_staking(LP_STAKING, None, RON_WETH);
        chain.configure_staking(LAND_STAKING, Some(AXS), AXS);
        chain.configure_staking(AXS_STAKING, Some(AXS), AXS);
        chain.set_liquidity_mint(RON_WETH, ether(10));

        Self { chain, deployment }
    }

    pub fn executor(&self) -> Executor<'_> {
        Executor::new(&self.chain, ExecutorSettings::from_deployment(&self.deployment))
    }

    /// Every submission used exactly twice its estimate.
    pub fn assert_gas_doubled(&self) {
        for submitted in self.chain.submissions() {
            assert_eq!(
                submitted.gas_limit,
                2 * MockChain::gas_for(&submitted.call),
                "gas limit of {}",
                submitted.call.label
            );
        }
    }
}
