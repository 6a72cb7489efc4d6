//! Adversarial states pushed straight into the risk stage: every attack must
//! terminate in `rejected` with the specific failing check flagged, and the
//! plan builder must refuse the result.

use quantvault::application::agents::PipelineState;
use quantvault::application::agents::risk::RiskAgent;
use quantvault::application::plan_builder::{self, PlanContext};
use quantvault::domain::risk::RiskLimits;
use quantvault::domain::types::{OptimizationResult, PipelineStatus, SlippageEstimate};
use std::collections::{BTreeMap, HashMap};

fn optimization(
    entries: &[(&str, u8, f64)],
    expected_return: f64,
    expected_risk: f64,
    solver_time_s: f64,
) -> OptimizationResult {
    let mut allocation = BTreeMap::new();
    let mut weights = BTreeMap::new();
    for (symbol, bit, weight) in entries {
        allocation.insert(symbol.to_string(), *bit);
        weights.insert(symbol.to_string(), *weight);
    }
    OptimizationResult {
        allocation,
        weights,
        expected_return,
        expected_risk,
        energy: -1.0,
        solver_name: "attacker".to_string(),
        solver_time_s,
        feasible: true,
        reason: String::new(),
    }
}

async fn run_risk(result: OptimizationResult) -> PipelineState {
    let mut state = PipelineState::new("attacker", 0.5, true);
    state.optimization_result = Some(result);
    RiskAgent::new(RiskLimits::default())
        .run(&mut state)
        .await
        .unwrap();
    state
}

fn assert_plan_refused(state: &PipelineState) {
    let ctx = PlanContext {
        portfolio_id: "0xp".to_string(),
        portfolio_value_usd: 50_000.0,
        max_portfolio_risk: 0.45,
        prices: HashMap::new(),
    };
    assert!(plan_builder::build_plan(state, &ctx).is_err());
}

#[tokio::test]
async fn attack_concentrated_position() {
    let state = run_risk(optimization(
        &[
            ("SUI", 1, 1.0),
            ("ETH", 0, 0.0),
            ("BTC", 0, 0.0),
            ("SOL", 0, 0.0),
            ("AVAX", 0, 0.0),
        ],
        0.35,
        0.40,
        0.01,
    ))
    .await;

    assert_eq!(state.status, PipelineStatus::Rejected);
    let checks = state.risk_checks.unwrap();
    assert!(!checks.position_size_ok);
    assert!(!state.risk_approved);
    assert_plan_refused(&state);
}

#[tokio::test]
async fn attack_extreme_risk() {
    let state = run_risk(optimization(
        &[("SUI", 1, 0.33), ("ETH", 1, 0.33), ("SOL", 1, 0.34)],
        0.25,
        0.80,
        0.01,
    ))
    .await;

    assert_eq!(state.status, PipelineStatus::Rejected);
    assert!(!state.risk_checks.unwrap().risk_within_limit);
    assert_plan_refused(&state);
}

#[tokio::test]
async fn attack_zero_return() {
    let state = run_risk(optimization(
        &[("SUI", 1, 0.33), ("ETH", 1, 0.33), ("BTC", 1, 0.34)],
        0.0,
        0.15,
        0.01,
    ))
    .await;

    assert_eq!(state.status, PipelineStatus::Rejected);
    assert!(!state.risk_checks.unwrap().return_sufficient);
    assert_plan_refused(&state);
}

#[tokio::test]
async fn attack_slow_solver() {
    let state = run_risk(optimization(
        &[("SUI", 1, 0.33), ("BTC", 1, 0.33), ("SOL", 1, 0.34)],
        0.20,
        0.20,
        12.0,
    ))
    .await;

    assert_eq!(state.status, PipelineStatus::Rejected);
    assert!(!state.risk_checks.unwrap().solver_fast_enough);
    assert_plan_refused(&state);
}

#[tokio::test]
async fn attack_empty_portfolio() {
    let state = run_risk(optimization(
        &[
            ("SUI", 0, 0.0),
            ("ETH", 0, 0.0),
            ("BTC", 0, 0.0),
            ("SOL", 0, 0.0),
            ("AVAX", 0, 0.0),
        ],
        0.0,
        0.0,
        0.01,
    ))
    .await;

    assert_eq!(state.status, PipelineStatus::Rejected);
    assert!(!state.risk_checks.unwrap().assets_selected);
    assert_plan_refused(&state);
}

#[tokio::test]
async fn attack_excessive_market_impact() {
    let mut state = PipelineState::new("attacker", 0.5, true);
    state.optimization_result = Some(optimization(
        &[("SUI", 1, 0.5), ("ETH", 1, 0.5)],
        0.20,
        0.20,
        0.01,
    ));
    state.slippage_estimates.insert(
        "SUI".to_string(),
        SlippageEstimate {
            symbol: "SUI".to_string(),
            order_size_usd: 25_000.0,
            daily_volume_usd: 100_000.0,
            volume_fraction: 0.25,
            raw_impact_pct: 0.12,
            safety_margin_pct: 0.005,
            total_slippage_pct: 0.125,
            min_out_usd: 21_875.0,
            min_out_base_units: 0,
            alpha: 0.12,
            beta: 0.65,
            exceeds_max_impact: true,
        },
    );
    RiskAgent::new(RiskLimits::default())
        .run(&mut state)
        .await
        .unwrap();

    assert_eq!(state.status, PipelineStatus::Rejected);
    assert!(!state.risk_checks.unwrap().slippage_acceptable);
    assert_plan_refused(&state);
}

#[tokio::test]
async fn attack_infeasible_optimizer_output() {
    let mut result = optimization(
        &[("SUI", 1, 0.45), ("ETH", 1, 0.30), ("BTC", 1, 0.25)],
        0.25,
        0.22,
        0.01,
    );
    result.feasible = false;
    result.reason = "SUI weight 45.00% > max 40.00%".to_string();
    let state = run_risk(result).await;

    assert_eq!(state.status, PipelineStatus::Rejected);
    let checks = state.risk_checks.unwrap();
    assert!(!checks.optimizer_feasible);
    // The 45% weight also trips the position-size check independently.
    assert!(!checks.position_size_ok);
}

#[tokio::test]
async fn rejected_states_keep_full_check_map() {
    // Even a maximally broken state reports all seven checks.
    let state = run_risk(optimization(&[("SUI", 1, 1.0)], 0.0, 0.99, 30.0)).await;
    let checks = state.risk_checks.unwrap();
    assert_eq!(checks.iter().len(), 7);
    assert_eq!(
        checks.failed_names(),
        vec![
            "position_size_ok",
            "risk_within_limit",
            "return_sufficient",
            "solver_fast_enough",
        ]
    );
}
