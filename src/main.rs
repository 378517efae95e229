//! Yield Farming Maintenance Bot
//!
//! Operator CLI for an EVM yield farming deployment:
//! - Balance, staking, pending reward and LP position reports
//! - Cross-asset prices through the hub token
//! - Reward sweeps: claim, consolidate, restake, stake
//! - LP sweeps: claim, sell surplus, add liquidity, stake LP

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use farmer_chain::RpcChain;
use farmer_core::units::round_display;
use farmer_core::{
    AccountAmount, Deployment, DeploymentLoader, PortfolioReport, PositionReader, PriceTable,
    SweepEvent, SweepObserver, SweepStep, Sweeper, TracingObserver,
};

#[derive(Parser)]
#[command(name = "farmer")]
#[command(about = "Yield farming maintenance bot", long_about = None)]
struct Cli {
    /// Deployment name (file under <config-dir>/deployments/)
    #[arg(long, global = true, env = "DEPLOYMENT", default_value = "ronin")]
    deployment: String,

    /// Configuration directory
    #[arg(long, global = true, env = "CONFIG_DIR", default_value = "./config")]
    config_dir: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the deployments available in the config directory
    Deployments,
    /// Native balance of every account
    Balance,
    /// Token balance of every account
    TokenBalance {
        /// Token symbol (e.g. AXS, WETH, RON)
        symbol: String,
    },
    /// Principal staked at the reward staking contract
    Staked,
    /// Every pending reward
    Pending,
    /// Prices of every pooled asset
    Prices,
    /// Value everything in the reference currency
    Portfolio {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Top secondary accounts up to the native target
    Topup,
    /// Claim rewards at every reward source
    Claim,
    /// Move the reward token to the primary account
    Consolidate,
    /// Restake pending staking rewards
    Restake,
    /// Stake the whole reward token balance
    StakeAll,
    /// Claim LP staking rewards
    LpClaim,
    /// Sell half the native surplus above the floor
    Sell,
    /// Add liquidity and stake the LP tokens
    LpAdd,
    /// Stake LP tokens
    LpStake,
    /// Claim, consolidate, restake and stake rewards
    RewardSweep,
    /// Claim LP rewards, sell, add liquidity and stake
    LpSweep,
    /// Full maintenance cycle
    Sweep,
}

impl Commands {
    /// Steps a transacting command runs, `None` for read-only commands.
    fn steps(&self) -> Option<&'static [SweepStep]> {
        let steps: &'static [SweepStep] = match self {
            Self::Topup => &[SweepStep::TopUp],
            Self::Claim => &[SweepStep::ClaimRewards],
            Self::Consolidate => &[SweepStep::Consolidate],
            Self::Restake => &[SweepStep::Restake],
            Self::StakeAll => &[SweepStep::StakeAll],
            Self::LpClaim => &[SweepStep::ClaimLpRewards],
            Self::Sell => &[SweepStep::SellSurplus],
            Self::LpAdd => &[SweepStep::DepositLiquidity, SweepStep::StakeLiquidity],
            Self::LpStake => &[SweepStep::StakeLiquidity],
            Self::RewardSweep => &SweepStep::REWARDS,
            Self::LpSweep => &SweepStep::LIQUIDITY,
            Self::Sweep => &SweepStep::FULL,
            _ => return None,
        };
        Some(steps)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let loader = DeploymentLoader::new(&cli.config_dir);
    if let Commands::Deployments = cli.command {
        for name in loader.available_deployments()? {
            let marker = if name == cli.deployment { "*" } else { " " };
            println!("{marker} {name}");
        }
        return Ok(());
    }

    let deployment = loader
        .load(&cli.deployment)
        .with_context(|| format!("loading deployment `{}`", cli.deployment))?;

    let chain_settings = &deployment.chain;
    info!(
        deployment = %deployment.name,
        chain = %chain_settings.name,
        chain_id = chain_settings.chain_id,
        accounts = deployment.accounts().len(),
        pools = deployment.pools.len(),
        "Starting farmer"
    );

    let chain = RpcChain::connect(
        &chain_settings.rpc_url,
        chain_settings.chain_id,
        deployment.signers()?,
        chain_settings.gas.clone(),
        chain_settings.block_time,
    )
    .await?;

    let reader = PositionReader::new(&chain, &deployment);
    match &cli.command {
        Commands::Balance => print_amounts("Native balances", &reader.native_balances().await?),
        Commands::TokenBalance { symbol } => {
            let balances = reader.token_balances(symbol).await?;
            print_amounts(&format!("{} balances", symbol.to_uppercase()), &balances);
        }
        Commands::Staked => print_amounts("Staked", &[reader.staked_principal().await?]),
        Commands::Pending => {
            let pending = reader.pending().await?;
            println!("Pending rewards");
            for reward in &pending.reward_sources {
                println!(
                    "  {:<24} {:<10} {:>16.4} {}",
                    reward.source,
                    reward.role,
                    reward.amount.display(),
                    reward.amount.symbol
                );
            }
            println!(
                "  {:<24} {:<10} {:>16.4} {}",
                pending.staking.source,
                pending.staking.role,
                pending.staking.amount.display(),
                pending.staking.amount.symbol
            );
            for reward in &pending.lp {
                println!(
                    "  {:<24} {:<10} {:>16.4} {}",
                    reward.source,
                    reward.role,
                    reward.amount.display(),
                    reward.amount.symbol
                );
            }
            let total = pending.lp_total();
            println!("  {:<35} {:>16.4} {}", "LP total", total.display(), total.symbol);
        }
        Commands::Prices => {
            print_timestamp();
            print_prices(&reader.price_table().await?);
        }
        Commands::Portfolio { json } => {
            print_timestamp();
            let report = reader.portfolio().await?.rounded();
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_portfolio(&report);
            }
        }
        command => {
            let steps = command
                .steps()
                .context("command has no sweep steps")?;
            run_steps(&chain, &deployment, steps).await?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,farmer_core=debug,farmer_chain=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn print_timestamp() {
    println!("{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
}

async fn run_steps(chain: &RpcChain, deployment: &Deployment, steps: &[SweepStep]) -> Result<()> {
    print_timestamp();
    let observer = ConsoleObserver;
    let sweeper = Sweeper::new(chain, deployment, &observer);
    let report = sweeper.run(steps).await?;
    println!(
        "Done: {} step(s), {} transaction(s)",
        report.steps.len(),
        report.transactions()
    );
    Ok(())
}

/// Prints progress for the operator and forwards it to the log.
struct ConsoleObserver;

impl SweepObserver for ConsoleObserver {
    fn on_event(&self, event: &SweepEvent) {
        TracingObserver.on_event(event);
        match event {
            SweepEvent::StepStarted { step } => println!("== {step}"),
            SweepEvent::Skipped { reason, .. } => println!("   skip: {reason}"),
            SweepEvent::Confirmed {
                label,
                tx_hash,
                gas_used,
                ..
            } => println!("   {label} {tx_hash} (gas used {gas_used})"),
            SweepEvent::Failed { step, error } => println!("   {step} failed: {error}"),
            _ => {}
        }
    }
}

fn print_amounts(title: &str, amounts: &[AccountAmount]) {
    println!("{title}");
    for entry in amounts {
        println!(
            "  {:<10} {} {:>16.4} {}",
            entry.role,
            entry.address,
            entry.amount.display(),
            entry.amount.symbol
        );
    }
}

fn print_prices(table: &PriceTable) {
    let reference = &table.reference_symbol;
    println!("Prices in {reference}");
    for row in &table.reference {
        match row.price {
            Some(price) => println!("  {:<12} {:>16.4}", row.symbol, round_display(price)),
            None => println!("  {:<12} {:>16}", row.symbol, "unavailable"),
        }
    }

    println!("Cross prices");
    for row in &table.cross {
        let pair = format!("{}/{}", row.symbol, row.quote);
        match row.price {
            Some(price) => println!("  {pair:<12} {price:>16.8}"),
            None => println!("  {pair:<12} {:>16}", "unavailable"),
        }
    }
}

fn print_portfolio(report: &PortfolioReport) {
    let reference = &report.reference_symbol;
    println!("Portfolio of {} in {reference}", report.deployment);
    for line in &report.lines {
        println!(
            "  {:<32} {:>16.4} {:<6} {:>14.4} {reference}",
            line.label, line.amount, line.symbol, line.value
        );
    }
    for position in &report.lp_positions {
        println!("  {} LP ({:.4}% of pool)", position.pool, position.share * 100.0);
        for token in [&position.token0, &position.token1] {
            println!(
                "    {:<30} {:>16.4} {:<6} {:>14.4} {reference}",
                token.symbol, token.amount, token.symbol, token.value
            );
        }
    }
    println!("  {:<32} {:>38.4} {reference}", "Total", report.total_value);
}
