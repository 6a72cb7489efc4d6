//! quantvault CLI - run the rebalancing decision pipeline end to end.
//!
//! # Usage
//! ```sh
//! cargo run -- optimize --risk 0.5 --mock
//! cargo run -- optimize --risk 0.8 --auto-approve --json-out result.json
//! ```
//!
//! `optimize` runs Market -> Execution -> Risk, prints the verdict, and on
//! approval builds the plan and hands it to the submitter (dry-run unless a
//! contract is configured). Plans that trip the approval thresholds are
//! parked in the in-memory approval store; `--auto-approve` resolves them
//! immediately, which is only meaningful for demos.

use anyhow::Result;
use clap::{Parser, Subcommand};
use quantvault::application::agents::execution::ExecutionAgent;
use quantvault::application::agents::market::MarketAgent;
use quantvault::application::agents::risk::RiskAgent;
use quantvault::application::approval::ApprovalStore;
use quantvault::application::market_data::mock::MockMarketData;
use quantvault::application::optimization::solver::AnnealParams;
use quantvault::application::pipeline::Pipeline;
use quantvault::application::plan_builder::{self, PlanContext};
use quantvault::config::Config;
use quantvault::domain::ports::{EntropySource, MarketDataProvider, PlanSubmitter};
use quantvault::domain::types::PipelineStatus;
use quantvault::infrastructure::entropy::{LocalEntropy, ProcessEntropy};
use quantvault::infrastructure::submitter::{CliSubmitter, CliSubmitterConfig};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "quantvault", about = "Autonomous portfolio-rebalancing pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decision pipeline and (on approval) submit the plan
    Optimize {
        /// Risk tolerance in [0, 1]
        #[arg(long, default_value_t = 0.5)]
        risk: f64,

        /// User identifier carried through the state
        #[arg(long, default_value = "demo-user")]
        user: String,

        /// Estimate from return history instead of the fixed mock universe
        #[arg(long)]
        live: bool,

        /// Never reach the submitter, even when a contract is configured
        #[arg(long)]
        dry_run: bool,

        /// Fixed solver seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Resolve a pending approval immediately (demo only)
        #[arg(long)]
        auto_approve: bool,

        /// Write the final state snapshot to a JSON file
        #[arg(long)]
        json_out: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Optimize {
            risk,
            user,
            live,
            dry_run,
            seed,
            auto_approve,
            json_out,
        } => run_optimize(&config, risk, &user, !live, dry_run, seed, auto_approve, json_out).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_optimize(
    config: &Config,
    risk: f64,
    user: &str,
    mock: bool,
    dry_run: bool,
    seed: Option<u64>,
    auto_approve: bool,
    json_out: Option<String>,
) -> Result<()> {
    info!("quantvault {} starting", env!("CARGO_PKG_VERSION"));

    let provider: Arc<dyn MarketDataProvider> = if mock {
        Arc::new(MockMarketData::new())
    } else {
        // No HTTP fetcher is wired in this build; estimate from synthetic
        // history so the estimator stack still runs.
        Arc::new(MockMarketData::with_synthetic_history(rand::random()))
    };
    let entropy: Arc<dyn EntropySource> = match &config.entropy_command {
        Some(command) => Arc::new(ProcessEntropy::new(command)),
        None => Arc::new(LocalEntropy),
    };

    let anneal = AnnealParams {
        num_reads: config.num_reads,
        num_sweeps: config.num_sweeps,
    };
    let mut execution = ExecutionAgent::new(
        entropy,
        anneal,
        config.min_weight,
        config.portfolio_value_usd,
    );
    if let Some(seed) = seed {
        execution = execution.with_seed(seed);
    }

    let pipeline = Pipeline::new(
        MarketAgent::new(provider.clone(), config.target_avg_vol),
        execution,
        RiskAgent::new(config.risk_limits()),
    );

    let state = pipeline.run(user, risk, mock).await;

    println!("\n==================== PIPELINE RESULT ====================");
    println!("Status   : {}", state.status);
    println!("Approved : {}", state.risk_approved);
    if let Some(opt) = &state.optimization_result {
        println!("Solver   : {} ({:.3}s)", opt.solver_name, opt.solver_time_s);
        println!("E(r)     : {:.4}", opt.expected_return);
        println!("Risk     : {:.4}", opt.expected_risk);
        println!("Energy   : {:.4}", opt.energy);
        println!("Allocation:");
        for (symbol, weight) in &opt.weights {
            let flag = if opt.allocation[symbol] == 1 { "x" } else { " " };
            println!("  [{flag}] {symbol:6} {:5.1}%", weight * 100.0);
        }
    }
    println!("Report   : {}", state.risk_report);

    let submitter = CliSubmitter::new(CliSubmitterConfig {
        bin: config.chain_cli_bin.clone(),
        package_id: if dry_run { String::new() } else { config.package_id.clone() },
        portfolio_id: config.portfolio_object_id.clone(),
        agent_cap_id: config.agent_cap_id.clone(),
        gas_budget: config.gas_budget,
    });

    let mut submitted_receipt = None;
    match state.status {
        PipelineStatus::Approved => {
            let ctx = PlanContext {
                portfolio_id: config.portfolio_object_id.clone(),
                portfolio_value_usd: config.portfolio_value_usd,
                max_portfolio_risk: config.max_portfolio_risk,
                prices: provider.current_prices().await.unwrap_or_default(),
            };
            let plan = plan_builder::build_plan(&state, &ctx)?;
            println!("\nPlan: {} legs, quantum score {}", plan.intents.len(), plan.quantum_score);
            let receipt = submitter.submit(&plan).await?;
            println!(
                "Submitted: {} (gas {}, dry_run {})",
                receipt.digest, receipt.gas_used, receipt.dry_run
            );
            submitted_receipt = Some(receipt);
        }
        PipelineStatus::PendingApproval => {
            let ctx = PlanContext {
                portfolio_id: config.portfolio_object_id.clone(),
                portfolio_value_usd: config.portfolio_value_usd,
                max_portfolio_risk: config.max_portfolio_risk,
                prices: provider.current_prices().await.unwrap_or_default(),
            };
            let plan = plan_builder::build_plan(&state, &ctx)?;
            let store = ApprovalStore::new();
            let id = store.create(plan, state.approval_reasons.clone(), state.snapshot());
            println!("\nPlan parked pending approval: id={id}");
            for reason in &state.approval_reasons {
                println!("  - {reason}");
            }
            if auto_approve {
                if let Some(pending) = store.resolve(&id) {
                    println!("Auto-approving {id} ...");
                    let receipt = submitter.submit(&pending.plan).await?;
                    println!(
                        "Submitted: {} (gas {}, dry_run {})",
                        receipt.digest, receipt.gas_used, receipt.dry_run
                    );
                    submitted_receipt = Some(receipt);
                }
            }
        }
        PipelineStatus::Rejected => {
            println!("\nPlan rejected - nothing submitted.");
        }
        PipelineStatus::Error | PipelineStatus::Pending => {
            println!("\nPipeline did not complete - nothing submitted.");
        }
    }

    if let Some(path) = json_out {
        let mut snapshot = state.snapshot();
        if let Some(receipt) = submitted_receipt {
            snapshot["transaction"] = serde_json::to_value(&receipt)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        info!("Result written to {}", path);
    }

    Ok(())
}
