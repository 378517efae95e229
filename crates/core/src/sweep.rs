//! Reward sweep orchestration.
//!
//! A sweep is a fixed ordered list of [`SweepStep`]s. Each step reads fresh
//! state, checks its own precondition and turns into a logged no-op when
//! there is nothing to do. State-changing calls are issued one at a time and
//! each is confirmed before the next one starts. The first failure aborts
//! the remaining steps; earlier on-chain effects stay in place and
//! re-running the sweep picks up from wherever the chain state now is.

use crate::config::Deployment;
use crate::error::{FarmError, FarmResult};
use crate::executor::{sell_amount, Confirmed, Executor, ExecutorSettings};
use crate::units::format_units;
use alloy::primitives::{Address, TxHash, U256};
use farmer_chain::contracts::{IERC20, IStakingPool};
use farmer_chain::{AccountRole, ChainAccess, ContractCall};
use futures::future::try_join_all;
use std::fmt;
use tracing::{info, instrument, warn};

/// Native currency precision.
const NATIVE_DECIMALS: u8 = 18;

/// One idempotent maintenance step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepStep {
    /// Claim pending rewards at every reward source for every member account
    ClaimRewards,
    /// Move the reward token from secondary accounts to the primary account
    Consolidate,
    /// Restake pending rewards at the reward staking contract
    Restake,
    /// Stake the primary account's whole reward token balance
    StakeAll,
    /// Claim rewards at every LP staking contract
    ClaimLpRewards,
    /// Sell half the native surplus above the floor for the paired token
    SellSurplus,
    /// Deposit the paired token with matching native currency
    DepositLiquidity,
    /// Stake the resulting LP tokens
    StakeLiquidity,
    /// Top secondary accounts up to the native target
    TopUp,
}

impl SweepStep {
    /// The full maintenance cycle.
    pub const FULL: [SweepStep; 8] = [
        SweepStep::ClaimRewards,
        SweepStep::Consolidate,
        SweepStep::Restake,
        SweepStep::StakeAll,
        SweepStep::ClaimLpRewards,
        SweepStep::SellSurplus,
        SweepStep::DepositLiquidity,
        SweepStep::StakeLiquidity,
    ];

    /// Reward token half of the cycle.
    pub const REWARDS: [SweepStep; 4] = [
        SweepStep::ClaimRewards,
        SweepStep::Consolidate,
        SweepStep::Restake,
        SweepStep::StakeAll,
    ];

    /// Liquidity half of the cycle.
    pub const LIQUIDITY: [SweepStep; 4] = [
        SweepStep::ClaimLpRewards,
        SweepStep::SellSurplus,
        SweepStep::DepositLiquidity,
        SweepStep::StakeLiquidity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ClaimRewards => "claim-rewards",
            Self::Consolidate => "consolidate",
            Self::Restake => "restake",
            Self::StakeAll => "stake-all",
            Self::ClaimLpRewards => "lp-claim",
            Self::SellSurplus => "sell",
            Self::DepositLiquidity => "lp-deposit",
            Self::StakeLiquidity => "lp-stake",
            Self::TopUp => "topup",
        }
    }
}

impl fmt::Display for SweepStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress notifications emitted while a sweep runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepEvent {
    Started { steps: usize },
    StepStarted { step: SweepStep },
    /// A precondition was false; nothing was submitted for this part of the step
    Skipped { step: SweepStep, reason: String },
    Confirmed {
        step: SweepStep,
        label: String,
        tx_hash: TxHash,
        gas_used: u64,
    },
    StepCompleted { step: SweepStep, transactions: usize },
    Failed { step: SweepStep, error: String },
    Completed { steps: usize, transactions: usize },
}

/// Receives sweep progress.
pub trait SweepObserver: Send + Sync {
    fn on_event(&self, event: &SweepEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SweepObserver for TracingObserver {
    fn on_event(&self, event: &SweepEvent) {
        match event {
            SweepEvent::Started { steps } => info!(steps, "Sweep started"),
            SweepEvent::StepStarted { step } => info!(step = %step, "Step started"),
            SweepEvent::Skipped { step, reason } => info!(step = %step, reason = %reason, "Skipped"),
            SweepEvent::Confirmed {
                step,
                label,
                tx_hash,
                gas_used,
            } => info!(step = %step, label = %label, tx_hash = %tx_hash, gas_used, "Confirmed"),
            SweepEvent::StepCompleted { step, transactions } => {
                info!(step = %step, transactions, "Step completed")
            }
            SweepEvent::Failed { step, error } => warn!(step = %step, error = %error, "Step failed"),
            SweepEvent::Completed {
                steps,
                transactions,
            } => info!(steps, transactions, "Sweep completed"),
        }
    }
}

/// What one step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: SweepStep,
    pub transactions: Vec<Confirmed>,
    pub skipped: Vec<String>,
}

impl StepReport {
    fn new(step: SweepStep) -> Self {
        Self {
            step,
            transactions: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Whether the step submitted nothing.
    pub fn is_noop(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub steps: Vec<StepReport>,
}

impl SweepReport {
    pub fn transactions(&self) -> usize {
        self.steps.iter().map(|s| s.transactions.len()).sum()
    }
}

/// Runs sweep steps for one deployment.
pub struct Sweeper<'a> {
    chain: &'a dyn ChainAccess,
    deployment: &'a Deployment,
    executor: Executor<'a>,
    observer: &'a dyn SweepObserver,
}

impl<'a> Sweeper<'a> {
    pub fn new(
        chain: &'a dyn ChainAccess,
        deployment: &'a Deployment,
        observer: &'a dyn SweepObserver,
    ) -> Self {
        Self {
            chain,
            deployment,
            executor: Executor::new(chain, ExecutorSettings::from_deployment(deployment)),
            observer,
        }
    }

    /// Run `steps` in order, each to completion before the next.
    pub async fn run(&self, steps: &[SweepStep]) -> FarmResult<SweepReport> {
        self.observer.on_event(&SweepEvent::Started { steps: steps.len() });

        let mut report = SweepReport::default();
        for step in steps {
            report.steps.push(self.run_step(*step).await?);
        }

        self.observer.on_event(&SweepEvent::Completed {
            steps: report.steps.len(),
            transactions: report.transactions(),
        });
        Ok(report)
    }

    /// Run a single step.
    #[instrument(skip_all, fields(step = %step))]
    pub async fn run_step(&self, step: SweepStep) -> FarmResult<StepReport> {
        self.observer.on_event(&SweepEvent::StepStarted { step });

        let mut report = StepReport::new(step);
        let result = match step {
            SweepStep::ClaimRewards => self.claim_rewards(&mut report).await,
            SweepStep::Consolidate => self.consolidate(&mut report).await,
            SweepStep::Restake => self.restake(&mut report).await,
            SweepStep::StakeAll => self.stake_all(&mut report).await,
            SweepStep::ClaimLpRewards => self.claim_lp_rewards(&mut report).await,
            SweepStep::SellSurplus => self.sell_surplus(&mut report).await,
            SweepStep::DepositLiquidity => self.deposit_liquidity(&mut report).await,
            SweepStep::StakeLiquidity => self.stake_liquidity(&mut report).await,
            SweepStep::TopUp => self.top_up(&mut report).await,
        };

        if let Err(err) = result {
            self.observer.on_event(&SweepEvent::Failed {
                step,
                error: err.to_string(),
            });
            return Err(err);
        }

        self.observer.on_event(&SweepEvent::StepCompleted {
            step,
            transactions: report.transactions.len(),
        });
        Ok(report)
    }

    fn skip(&self, report: &mut StepReport, reason: String) {
        self.observer.on_event(&SweepEvent::Skipped {
            step: report.step,
            reason: reason.clone(),
        });
        report.skipped.push(reason);
    }

    fn record(&self, report: &mut StepReport, confirmed: Confirmed) {
        self.observer.on_event(&SweepEvent::Confirmed {
            step: report.step,
            label: confirmed.label.clone(),
            tx_hash: confirmed.receipt.hash,
            gas_used: confirmed.receipt.gas_used,
        });
        report.transactions.push(confirmed);
    }

    async fn submit(&self, report: &mut StepReport, call: ContractCall) -> FarmResult<()> {
        let confirmed = self.executor.submit(call).await?;
        self.record(report, confirmed);
        Ok(())
    }

    async fn address(&self, role: &AccountRole) -> FarmResult<Address> {
        Ok(self.chain.address_of(role).await?)
    }

    fn primary(&self) -> &AccountRole {
        &self.deployment.primary().role
    }

    /// Approve (if needed) then stake `token` balance of the primary account at `staking`.
    async fn stake_balance(
        &self,
        report: &mut StepReport,
        token: Address,
        staking: Address,
        what: &str,
    ) -> FarmResult<()> {
        let primary = self.primary();
        let owner = self.address(primary).await?;
        let balance = self.chain.token_balance(token, owner).await?;
        if balance.is_zero() {
            self.skip(report, format!("no {what} to stake"));
            return Ok(());
        }

        if let Some(approval) = self
            .executor
            .ensure_allowance(primary, token, staking, balance)
            .await?
        {
            self.record(report, approval);
        }

        info!(amount = %balance, staking = %staking, "Staking {what}");
        let call = ContractCall::encode(
            primary.clone(),
            staking,
            &IStakingPool::stakeCall { amount: balance },
        );
        self.submit(report, call).await
    }

    async fn claim_rewards(&self, report: &mut StepReport) -> FarmResult<()> {
        for source in &self.deployment.reward_sources {
            let pending = try_join_all(source.accounts.iter().map(|role| async move {
                let address = self.address(role).await?;
                let pending = self.chain.pending_rewards(source.staking, address).await?;
                Ok::<_, FarmError>((role, pending))
            }))
            .await?;

            for (role, pending) in pending {
                if pending.is_zero() {
                    self.skip(report, format!("no pending {} rewards for {role}", source.name));
                    continue;
                }
                info!(source = %source.name, account = %role, pending = %pending, "Claiming rewards");
                let call = ContractCall::encode(
                    role.clone(),
                    source.staking,
                    &IStakingPool::claimPendingRewardsCall {},
                );
                self.submit(report, call).await?;
            }
        }
        Ok(())
    }

    async fn consolidate(&self, report: &mut StepReport) -> FarmResult<()> {
        let token = self.deployment.contracts.reward_token;
        let recipient = self.address(self.primary()).await?;

        let balances = try_join_all(self.deployment.secondaries().map(|account| async move {
            let address = self.address(&account.role).await?;
            let balance = self.chain.token_balance(token, address).await?;
            Ok::<_, FarmError>((&account.role, balance))
        }))
        .await?;

        for (role, balance) in balances {
            if balance.is_zero() {
                self.skip(report, format!("no reward token to send from {role}"));
                continue;
            }
            info!(from = %role, to = %recipient, amount = %balance, "Consolidating reward token");
            let call = ContractCall::encode(
                role.clone(),
                token,
                &IERC20::transferCall {
                    to: recipient,
                    amount: balance,
                },
            );
            self.submit(report, call).await?;
        }
        Ok(())
    }

    async fn restake(&self, report: &mut StepReport) -> FarmResult<()> {
        let staking = self.deployment.contracts.reward_staking;
        let owner = self.address(self.primary()).await?;
        let pending = self.chain.pending_rewards(staking, owner).await?;
        if pending.is_zero() {
            self.skip(report, "no pending staking rewards to restake".to_string());
            return Ok(());
        }

        info!(pending = %pending, "Restaking rewards");
        let call = ContractCall::encode(
            self.primary().clone(),
            staking,
            &IStakingPool::restakeRewardsCall {},
        );
        self.submit(report, call).await
    }

    async fn stake_all(&self, report: &mut StepReport) -> FarmResult<()> {
        let contracts = &self.deployment.contracts;
        self.stake_balance(report, contracts.reward_token, contracts.reward_staking, "reward token")
            .await
    }

    async fn claim_lp_rewards(&self, report: &mut StepReport) -> FarmResult<()> {
        let owner = self.address(self.primary()).await?;
        let pending = try_join_all(self.deployment.staked_pools().map(|(pool, staking)| async move {
            let pending = self.chain.pending_rewards(staking, owner).await?;
            Ok::<_, FarmError>((pool, staking, pending))
        }))
        .await?;

        for (pool, staking, pending) in pending {
            if pending.is_zero() {
                self.skip(report, format!("no pending rewards in {}", pool.name));
                continue;
            }
            info!(pool = %pool.name, pending = %format_units(pending, NATIVE_DECIMALS), "Claiming LP rewards");
            let call = ContractCall::encode(
                self.primary().clone(),
                staking,
                &IStakingPool::claimPendingRewardsCall {},
            );
            self.submit(report, call).await?;
        }
        Ok(())
    }

    async fn sell_surplus(&self, report: &mut StepReport) -> FarmResult<()> {
        let (pool, _) = self.deployment.liquidity_pool()?;
        let owner = self.address(self.primary()).await?;
        let balance = self.chain.native_balance(owner).await?;
        let floor = self.deployment.native_floor;

        match sell_amount(balance, floor, &self.deployment.chain.native_symbol) {
            Ok(amount) if !amount.is_zero() => {}
            _ => {
                self.skip(
                    report,
                    format!(
                        "native balance {} does not leave a surplus above floor {}",
                        format_units(balance, NATIVE_DECIMALS),
                        format_units(floor, NATIVE_DECIMALS)
                    ),
                );
                return Ok(());
            }
        }

        let outcome = self
            .executor
            .sell_native_surplus(self.primary(), pool.pair)
            .await?;
        self.record(report, outcome.confirmed);
        Ok(())
    }

    async fn deposit_liquidity(&self, report: &mut StepReport) -> FarmResult<()> {
        let (pool, _) = self.deployment.liquidity_pool()?;
        let owner = self.address(self.primary()).await?;
        let state = self.executor.pair_state(pool.pair).await?;
        let (balance, paired) = tokio::try_join!(
            self.chain.native_balance(owner),
            self.chain.token_balance(state.paired_token, owner),
        )?;

        if paired.is_zero() {
            self.skip(report, format!("no {} to deposit", state.paired_symbol));
            return Ok(());
        }
        if balance <= self.deployment.native_floor {
            self.skip(
                report,
                format!(
                    "native balance {} does not exceed floor {}",
                    format_units(balance, NATIVE_DECIMALS),
                    format_units(self.deployment.native_floor, NATIVE_DECIMALS)
                ),
            );
            return Ok(());
        }

        let outcome = self
            .executor
            .add_native_liquidity(self.primary(), pool.pair)
            .await?;
        if let Some(approval) = outcome.approval {
            self.record(report, approval);
        }
        self.record(report, outcome.confirmed);
        Ok(())
    }

    async fn stake_liquidity(&self, report: &mut StepReport) -> FarmResult<()> {
        let (pool, staking) = self.deployment.liquidity_pool()?;
        let what = format!("{} LP", pool.name);
        self.stake_balance(report, pool.pair, staking, &what).await
    }

    async fn top_up(&self, report: &mut StepReport) -> FarmResult<()> {
        let target = self.deployment.topup_target;
        let balances = try_join_all(self.deployment.secondaries().map(|account| async move {
            let address = self.address(&account.role).await?;
            let balance = self.chain.native_balance(address).await?;
            Ok::<_, FarmError>((&account.role, address, balance))
        }))
        .await?;

        for (role, address, balance) in balances {
            if balance >= target {
                self.skip(report, format!("{role} already topped up"));
                continue;
            }
            let shortfall: U256 = target - balance;
            info!(account = %role, amount = %format_units(shortfall, NATIVE_DECIMALS), "Topping up");
            let call = ContractCall::native_transfer(self.primary().clone(), address, shortfall);
            self.submit(report, call).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<SweepEvent>>);

    impl SweepObserver for Recorder {
        fn on_event(&self, event: &SweepEvent) {
            self.0.lock().push(event.clone());
        }
    }

    impl Recorder {
        fn events(&self) -> Vec<SweepEvent> {
            self.0.lock().clone()
        }
    }

    fn seed_rewards(fx: &Fixture) {
        fx.chain.set_pending(LAND_STAKING, MAIN, ether(5));
        fx.chain.set_pending(LAND_STAKING, GENESIS, ether(3));
        fx.chain.set_pending(AXS_STAKING, MAIN, ether(2));
        fx.chain.set_pending(LP_STAKING, MAIN, ether(100));
    }

    #[test]
    fn test_step_groups() {
        assert_eq!(SweepStep::FULL[..4], SweepStep::REWARDS);
        assert_eq!(SweepStep::FULL[4..], SweepStep::LIQUIDITY);
        assert!(!SweepStep::FULL.contains(&SweepStep::TopUp));
        assert_eq!(SweepStep::ClaimLpRewards.to_string(), "lp-claim");
    }

    #[tokio::test]
    async fn test_claim_with_nothing_pending_is_noop() {
        let fx = Fixture::new();
        let recorder = Recorder::default();
        let sweeper = Sweeper::new(&fx.chain, &fx.deployment, &recorder);

        let report = sweeper.run_step(SweepStep::ClaimRewards).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(fx.chain.estimate_count(), 0);
        assert!(fx.chain.submissions().is_empty());
        assert!(recorder
            .events()
            .iter()
            .any(|e| matches!(e, SweepEvent::Skipped { step: SweepStep::ClaimRewards, .. })));
    }

    #[tokio::test]
    async fn test_full_sweep() {
        let fx = Fixture::new();
        seed_rewards(&fx);
        let recorder = Recorder::default();
        let sweeper = Sweeper::new(&fx.chain, &fx.deployment, &recorder);

        let report = sweeper.run(&SweepStep::FULL).await.unwrap();
        assert_eq!(report.steps.len(), 8);
        assert_eq!(report.transactions(), 12);

        assert_eq!(
            fx.chain.submitted_labels(),
            vec![
                "claimPendingRewards()",
                "claimPendingRewards()",
                "transfer(address,uint256)",
                "restakeRewards()",
                "approve(address,uint256)",
                "stake(uint256)",
                "claimPendingRewards()",
                "swapExactRONForTokens(uint256,address[],address,uint256)",
                "approve(address,uint256)",
                "addLiquidityRON(address,uint256,uint256,uint256,address,uint256)",
                "approve(address,uint256)",
                "stake(uint256)",
            ]
        );
        fx.assert_gas_doubled();

        assert!(fx.chain.balance_of(AXS, GENESIS).is_zero());
        assert!(fx.chain.balance_of(AXS, MAIN).is_zero());
        assert_eq!(fx.chain.staked_of(AXS_STAKING, MAIN), ether(10));
        assert_eq!(fx.chain.staked_of(LP_STAKING, MAIN), ether(10));
        assert!(fx.chain.native_of(MAIN) >= fx.deployment.native_floor);

        let events = recorder.events();
        assert_eq!(events.first(), Some(&SweepEvent::Started { steps: 8 }));
        assert_eq!(
            events.last(),
            Some(&SweepEvent::Completed {
                steps: 8,
                transactions: 12
            })
        );
    }

    #[tokio::test]
    async fn test_rerun_after_rewards_sweep_is_noop() {
        let fx = Fixture::new();
        seed_rewards(&fx);
        let sweeper = Sweeper::new(&fx.chain, &fx.deployment, &TracingObserver);

        sweeper.run(&SweepStep::REWARDS).await.unwrap();
        let submitted = fx.chain.submissions().len();

        let report = sweeper.run(&SweepStep::REWARDS).await.unwrap();
        assert!(report.steps.iter().all(StepReport::is_noop));
        assert_eq!(fx.chain.submissions().len(), submitted);
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_steps() {
        let fx = Fixture::new();
        seed_rewards(&fx);
        fx.chain.fail_estimate("restakeRewards");
        let recorder = Recorder::default();
        let sweeper = Sweeper::new(&fx.chain, &fx.deployment, &recorder);

        let err = sweeper.run(&SweepStep::FULL).await.unwrap_err();
        assert!(matches!(err, FarmError::EstimationFailure { .. }));
        assert_eq!(fx.chain.submissions().len(), 3);

        let events = recorder.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, SweepEvent::Failed { step: SweepStep::Restake, .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SweepEvent::StepStarted { step: SweepStep::StakeAll })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SweepEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn test_sell_skipped_at_floor() {
        let fx = Fixture::new();
        fx.chain.set_native(MAIN, ether(500));
        let sweeper = Sweeper::new(&fx.chain, &fx.deployment, &TracingObserver);

        let report = sweeper.run_step(SweepStep::SellSurplus).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(fx.chain.estimate_count(), 0);

        fx.chain.set_native(MAIN, ether(500) + U256::from(1u64));
        let report = sweeper.run_step(SweepStep::SellSurplus).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(fx.chain.estimate_count(), 0);
    }

    #[tokio::test]
    async fn test_deposit_skipped_without_paired_token() {
        let fx = Fixture::new();
        let sweeper = Sweeper::new(&fx.chain, &fx.deployment, &TracingObserver);

        let report = sweeper.run_step(SweepStep::DepositLiquidity).await.unwrap();
        assert_eq!(report.skipped, vec!["no WETH to deposit".to_string()]);
        assert!(fx.chain.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_top_up_secondary_accounts() {
        let fx = Fixture::new();
        fx.chain.set_native(GENESIS, ether(1) / U256::from(4u64));
        let sweeper = Sweeper::new(&fx.chain, &fx.deployment, &TracingObserver);

        let report = sweeper.run_step(SweepStep::TopUp).await.unwrap();
        assert_eq!(report.transactions.len(), 1);
        assert_eq!(fx.chain.native_of(GENESIS), ether(1));
        assert_eq!(
            fx.chain.native_of(MAIN),
            ether(1000) - ether(3) / U256::from(4u64)
        );

        let report = sweeper.run_step(SweepStep::TopUp).await.unwrap();
        assert!(report.is_noop());
    }
}
