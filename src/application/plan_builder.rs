//! Translate an approved pipeline state into the immutable rebalance plan:
//! ordered swap intents with per-leg minimum outputs, the quantum score, and
//! the canonical audit proof hash.

use crate::application::agents::PipelineState;
use crate::application::optimization::slippage;
use crate::domain::errors::PipelineError;
use crate::domain::plan::{RebalancePlan, SwapIntent};
use crate::domain::types::OptimizationResult;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Inputs the builder needs beyond the pipeline state itself.
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub portfolio_id: String,
    /// Sizing base for converting weights to notional legs.
    pub portfolio_value_usd: f64,
    /// Denominator of the quantum score.
    pub max_portfolio_risk: f64,
    /// Spot prices per symbol; missing symbols use the proxy price.
    pub prices: HashMap<String, f64>,
}

/// Cap on the reason string forwarded on-chain.
const MAX_REASON_BYTES: usize = 256;

/// Build the plan from a state whose seven risk checks all passed.
pub fn build_plan(state: &PipelineState, ctx: &PlanContext) -> Result<RebalancePlan, PipelineError> {
    let checks = state
        .risk_checks
        .ok_or_else(|| PipelineError::InvalidInput("no risk checks in state".into()))?;
    if !checks.all_passed() {
        return Err(PipelineError::InvalidInput(
            "plan requested for a state that failed risk checks".into(),
        ));
    }
    let opt = state
        .optimization_result
        .as_ref()
        .ok_or_else(|| PipelineError::InvalidInput("no optimization result in state".into()))?;

    // Legs ordered by descending weight, ties broken by symbol.
    let mut legs: Vec<(&String, f64)> = opt
        .weights
        .iter()
        .filter(|(symbol, w)| **w > 0.0 && opt.allocation.get(*symbol).copied() == Some(1))
        .map(|(symbol, w)| (symbol, *w))
        .collect();
    legs.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let intents: Vec<SwapIntent> = legs
        .iter()
        .map(|(symbol, weight)| {
            let price = ctx
                .prices
                .get(symbol.as_str())
                .copied()
                .unwrap_or(slippage::DEFAULT_PROXY_PRICE_USD);
            let decimals = slippage::decimals_for(symbol);
            let amount_usd = ctx.portfolio_value_usd * weight;
            let min_out = state
                .slippage_estimates
                .get(symbol.as_str())
                .map(|e| slippage::to_base_units(e.min_out_usd, price, decimals))
                .unwrap_or(0);
            SwapIntent {
                symbol: (*symbol).clone(),
                amount_base_units: slippage::to_base_units(amount_usd, price, decimals),
                min_out_base_units: min_out,
                venue_hint: None,
            }
        })
        .collect();

    let reason = truncate_utf8(
        &format!(
            "QUBO rebalance | E(r)={:.4} sigma={:.4} | {} legs",
            opt.expected_return,
            opt.expected_risk,
            intents.len()
        ),
        MAX_REASON_BYTES,
    );

    Ok(RebalancePlan {
        portfolio_id: ctx.portfolio_id.clone(),
        intents,
        is_quantum_optimized: true,
        quantum_score: quantum_score(opt.expected_risk, ctx.max_portfolio_risk),
        audit_proof_hash: audit_proof_hash(opt),
        reason,
    })
}

/// 100 when riskless, 0 at (or beyond) the portfolio risk cap.
pub fn quantum_score(expected_risk: f64, max_portfolio_risk: f64) -> u8 {
    if max_portfolio_risk <= 0.0 {
        return 0;
    }
    let score = (100.0 * (1.0 - expected_risk / max_portfolio_risk)).round();
    score.clamp(0.0, 100.0) as u8
}

/// SHA-256 over a canonical encoding of the optimization outcome. Keys are
/// sorted and floats rounded to 12 decimal places, so representations that
/// agree within 1e-12 hash identically.
pub fn audit_proof_hash(opt: &OptimizationResult) -> [u8; 32] {
    let mut canonical = String::from("allocation{");
    for (symbol, bit) in &opt.allocation {
        canonical.push_str(&format!("{symbol}={bit};"));
    }
    canonical.push_str("}weights{");
    for (symbol, w) in &opt.weights {
        canonical.push_str(&format!("{symbol}={};", canonical_f64(*w)));
    }
    canonical.push_str(&format!(
        "}}expected_return={};expected_risk={};energy={}",
        canonical_f64(opt.expected_return),
        canonical_f64(opt.expected_risk),
        canonical_f64(opt.energy)
    ));

    let digest = Sha256::digest(canonical.as_bytes());
    digest.into()
}

fn canonical_f64(x: f64) -> String {
    format!("{x:.12}")
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
