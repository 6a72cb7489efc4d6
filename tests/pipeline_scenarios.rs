//! End-to-end pipeline scenarios over the 5-asset mock universe.

use anyhow::Result;
use async_trait::async_trait;
use quantvault::application::agents::execution::ExecutionAgent;
use quantvault::application::agents::market::MarketAgent;
use quantvault::application::agents::risk::RiskAgent;
use quantvault::application::approval::ApprovalStore;
use quantvault::application::market_data::mock::MockMarketData;
use quantvault::application::optimization::solver::AnnealParams;
use quantvault::application::pipeline::Pipeline;
use quantvault::application::plan_builder::{self, PlanContext};
use quantvault::domain::ports::{BitCounts, EntropySource};
use quantvault::domain::risk::RiskLimits;
use quantvault::domain::types::PipelineStatus;
use std::collections::HashMap;
use std::sync::Arc;

/// Entropy double: all zeros, so the execution jitter is 0 s.
struct ZeroEntropy;

#[async_trait]
impl EntropySource for ZeroEntropy {
    async fn draw(&self, shots: u32) -> Result<BitCounts> {
        Ok(BitCounts {
            zeros: shots as u64,
            ones: 0,
        })
    }
    fn name(&self) -> &str {
        "zero"
    }
}

fn pipeline_with_limits(limits: RiskLimits) -> Pipeline {
    Pipeline::new(
        MarketAgent::new(Arc::new(MockMarketData::new()), 0.35),
        ExecutionAgent::new(Arc::new(ZeroEntropy), AnnealParams::default(), 0.05, 50_000.0)
            .with_seed(2024),
        RiskAgent::new(limits),
    )
}

/// Limits with the worst-case notional proxy scaled below the sign-off
/// threshold, so only the risk trigger can park a plan.
fn small_book_limits() -> RiskLimits {
    RiskLimits {
        max_daily_volume_usd: 40_000.0,
        ..RiskLimits::default()
    }
}

#[tokio::test]
async fn scenario_five_asset_universe_risk_half() {
    let pipeline = pipeline_with_limits(small_book_limits());
    let state = pipeline.run("scenario-1", 0.5, true).await;

    let opt = state.optimization_result.as_ref().expect("must optimize");

    // Exactly K = 3 bits set for risk tolerance 0.5 on 5 assets.
    assert_eq!(opt.num_selected(), 3);

    // Weights sum to 1 and live inside [MIN_WEIGHT, max_weight].
    let total: f64 = opt.weights.values().sum();
    assert!((total - 1.0).abs() < 1e-6, "weights sum {total}");
    for (symbol, weight) in &opt.weights {
        if opt.allocation[symbol] == 1 {
            assert!(*weight >= 0.05 - 1e-9, "{symbol} weight {weight} below floor");
            assert!(*weight <= 0.40 + 1e-9, "{symbol} weight {weight} above cap");
        } else {
            assert_eq!(*weight, 0.0, "{symbol} unselected but weighted");
        }
    }

    // All seven checks true and the run is approved outright (the notional
    // proxy is configured below the sign-off threshold here).
    let checks = state.risk_checks.expect("checks must run");
    assert!(checks.all_passed(), "failed: {:?}", checks.failed_names());
    assert!(state.risk_approved);
    assert_eq!(state.status, PipelineStatus::Approved);

    // Plan builds with one leg per selected asset, ordered by weight.
    let ctx = PlanContext {
        portfolio_id: "0xportfolio".to_string(),
        portfolio_value_usd: 50_000.0,
        max_portfolio_risk: 0.45,
        prices: HashMap::new(),
    };
    let plan = plan_builder::build_plan(&state, &ctx).expect("plan must build");
    assert_eq!(plan.intents.len(), 3);
    assert!(plan.is_quantum_optimized);
    for pair in plan.intents.windows(2) {
        let w0 = opt.weights[&pair[0].symbol];
        let w1 = opt.weights[&pair[1].symbol];
        assert!(w0 >= w1, "legs must be ordered by descending weight");
    }
    for intent in &plan.intents {
        assert!(intent.min_out_base_units <= intent.amount_base_units);
        assert!(intent.min_out_base_units > 0);
    }
}

#[tokio::test]
async fn scenario_default_limits_require_sign_off() {
    // Under the default $1M worst-case notional proxy, a fully invested
    // portfolio always crosses the $50k threshold: checks pass, the plan is
    // parked, nothing is submitted.
    let pipeline = pipeline_with_limits(RiskLimits::default());
    let state = pipeline.run("scenario-6", 0.5, true).await;

    assert!(state.risk_approved, "all checks should still pass");
    assert_eq!(state.status, PipelineStatus::PendingApproval);
    assert!(state.requires_approval);
    assert!(!state.approval_reasons.is_empty());

    // The plan can be built and parked for an operator.
    let ctx = PlanContext {
        portfolio_id: "0xportfolio".to_string(),
        portfolio_value_usd: 50_000.0,
        max_portfolio_risk: 0.45,
        prices: HashMap::new(),
    };
    let plan = plan_builder::build_plan(&state, &ctx).unwrap();
    let store = ApprovalStore::new();
    let id = store.create(plan, state.approval_reasons.clone(), state.snapshot());

    // Resolving hands the plan over exactly once.
    assert!(store.resolve(&id).is_some());
    assert!(store.resolve(&id).is_none());
}

#[tokio::test]
async fn scenario_deterministic_across_runs() {
    let a = pipeline_with_limits(small_book_limits())
        .run("repeat", 0.5, true)
        .await;
    let b = pipeline_with_limits(small_book_limits())
        .run("repeat", 0.5, true)
        .await;
    let opt_a = a.optimization_result.unwrap();
    let opt_b = b.optimization_result.unwrap();
    assert_eq!(opt_a.allocation, opt_b.allocation);
    assert_eq!(opt_a.energy, opt_b.energy);
    assert_eq!(
        plan_builder::audit_proof_hash(&opt_a),
        plan_builder::audit_proof_hash(&opt_b)
    );
}

#[tokio::test]
async fn scenario_aggressive_selects_more_assets() {
    let state = pipeline_with_limits(small_book_limits())
        .run("aggressive", 1.0, true)
        .await;
    let opt = state.optimization_result.unwrap();
    // K = clamp(floor(5 * 1.0) + 1, 2, 5) = 5.
    assert_eq!(opt.num_selected(), 5);
}

#[tokio::test]
async fn scenario_conservative_selects_minimum() {
    let state = pipeline_with_limits(small_book_limits())
        .run("conservative", 0.0, true)
        .await;
    let opt = state.optimization_result.unwrap();
    // K = clamp(floor(0) + 1, 2, 5) = 2.
    assert_eq!(opt.num_selected(), 2);
}

#[tokio::test]
async fn scenario_estimator_path_stays_within_guardrails() {
    // Synthetic history exercises GARCH + calibration + shrinkage; whatever
    // comes out must still satisfy the structural invariants.
    let pipeline = Pipeline::new(
        MarketAgent::new(Arc::new(MockMarketData::with_synthetic_history(77)), 0.35),
        ExecutionAgent::new(Arc::new(ZeroEntropy), AnnealParams::default(), 0.05, 50_000.0)
            .with_seed(8),
        RiskAgent::new(small_book_limits()),
    );
    let state = pipeline.run("estimator", 0.5, false).await;
    let opt = state.optimization_result.expect("pipeline must complete");

    if opt.num_selected() > 0 {
        let total: f64 = opt.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }
    for weight in opt.weights.values() {
        assert!(*weight >= 0.0 && *weight <= 0.40 + 1e-9);
    }
    assert!(matches!(
        state.status,
        PipelineStatus::Approved | PipelineStatus::PendingApproval | PipelineStatus::Rejected
    ));
}
