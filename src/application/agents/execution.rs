//! Execution stage: encode the selection QUBO, solve it, size the selected
//! positions, estimate per-leg slippage, and apply the entropy-derived
//! timing jitter that keeps rebalance submissions unpredictable to
//! front-runners.

use crate::application::agents::PipelineState;
use crate::application::optimization::qubo::{self, QuboParams};
use crate::application::optimization::slippage;
use crate::application::optimization::solver::{self, AnnealParams};
use crate::application::optimization::weights;
use crate::domain::errors::PipelineError;
use crate::domain::ports::EntropySource;
use crate::domain::types::OptimizationResult;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Shots drawn for the anti-front-running jitter.
const JITTER_SHOTS: u32 = 16;

/// Upper bound on the jitter delay.
const JITTER_MAX_S: f64 = 2.0;

pub struct ExecutionAgent {
    entropy: Arc<dyn EntropySource>,
    anneal: AnnealParams,
    min_weight: f64,
    portfolio_value_usd: f64,
    /// Fixed solver seed for reproducible runs; fresh OS entropy otherwise.
    seed: Option<u64>,
}

impl ExecutionAgent {
    pub fn new(
        entropy: Arc<dyn EntropySource>,
        anneal: AnnealParams,
        min_weight: f64,
        portfolio_value_usd: f64,
    ) -> Self {
        Self {
            entropy,
            anneal,
            min_weight,
            portfolio_value_usd,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub async fn run(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        state.log("ExecutionAgent", "Building QUBO model ...");

        let cov = state
            .cov
            .clone()
            .ok_or_else(|| PipelineError::InvalidInput("no covariance in state".into()))?;
        if state.assets.is_empty() {
            return Err(PipelineError::InvalidInput("no assets in state".into()));
        }

        let n = state.assets.len();
        let mu: Vec<f64> = state.assets.iter().map(|a| a.expected_return).collect();
        let max_weights: Vec<f64> = state.assets.iter().map(|a| a.max_weight).collect();

        let params = QuboParams::for_risk_tolerance(state.risk_tolerance, n);
        state.log(
            "ExecutionAgent",
            &format!(
                "QUBO params: target={}, lambda_risk={:.2}, lambda_return={:.2}",
                params.target_assets, params.lambda_risk, params.lambda_return
            ),
        );

        let bqm = qubo::build_selection_bqm(&mu, &cov, &params)?;

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::rng().next_u64()),
        };
        let output = solver::solve(&bqm, &self.anneal, &mut rng);

        let selected: Vec<usize> = output
            .bits
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == 1)
            .map(|(i, _)| i)
            .collect();

        // Continuous weights over the selected subset; unselected assets are
        // forced to zero.
        let mut allocation = BTreeMap::new();
        let mut weight_map = BTreeMap::new();
        for (i, asset) in state.assets.iter().enumerate() {
            allocation.insert(asset.symbol.clone(), output.bits[i]);
            weight_map.insert(asset.symbol.clone(), 0.0f64);
        }

        let (expected_return, expected_risk) = if selected.is_empty() {
            (0.0, 0.0)
        } else {
            let solution =
                weights::optimize_weights(&selected, &mu, &cov, &max_weights, self.min_weight);
            for (pos, &i) in selected.iter().enumerate() {
                weight_map.insert(state.assets[i].symbol.clone(), solution.weights[pos]);
            }
            (solution.expected_return, solution.expected_risk)
        };

        // Guardrail pre-check: a cap violation marks the result infeasible
        // rather than silently renormalizing it away.
        let mut feasible = true;
        let mut reason = String::new();
        for &i in &selected {
            let symbol = &state.assets[i].symbol;
            let w = weight_map[symbol];
            if w > state.assets[i].max_weight + 1e-9 {
                feasible = false;
                reason = format!(
                    "{} weight {:.2}% > max {:.2}%",
                    symbol,
                    w * 100.0,
                    state.assets[i].max_weight * 100.0
                );
                break;
            }
        }

        let result = OptimizationResult {
            allocation,
            weights: weight_map,
            expected_return,
            expected_risk,
            energy: output.energy,
            solver_name: output.solver_name.to_string(),
            solver_time_s: output.elapsed_s,
            feasible,
            reason,
        };

        let selected_symbols: Vec<&str> = result.selected_symbols();
        state.log(
            "ExecutionAgent",
            &format!(
                "Optimization complete in {:.3}s: selected={:?}, E(r)={:.4}, sigma={:.4}",
                result.solver_time_s, selected_symbols, result.expected_return, result.expected_risk
            ),
        );

        let mut detail = vec![
            "Selection and sizing:".to_string(),
            format!("  Selected: {:?}", selected_symbols),
            format!(
                "  E[r]={:.2}%, sigma={:.2}%, energy={:.6}",
                result.expected_return * 100.0,
                result.expected_risk * 100.0,
                result.energy
            ),
            format!(
                "  Solver: {} in {:.3}s, feasible: {}",
                result.solver_name, result.solver_time_s, result.feasible
            ),
        ];
        if !result.reason.is_empty() {
            detail.push(format!("  Reason: {}", result.reason));
        }
        state
            .reasoning
            .insert("ExecutionAgent".to_string(), detail.join("\n"));

        // Per-leg market impact before anything reaches the chain; the
        // contract will enforce each leg's min_out.
        let estimates = slippage::estimate_rebalance_slippage(
            &result.allocation,
            &result.weights,
            self.portfolio_value_usd,
            None,
            slippage::DEFAULT_PROXY_PRICE_USD,
        );
        if !estimates.is_empty() {
            let report = slippage::format_slippage_report(&estimates);
            state.log("ExecutionAgent", &report);
            if estimates.values().any(|e| e.exceeds_max_impact) {
                state.log(
                    "ExecutionAgent",
                    "WARNING: some swaps exceed the max impact threshold",
                );
            }
        }
        state.slippage_estimates = estimates;
        state.optimization_result = Some(result);

        // Entropy-derived jitter: delay in [0, 2] s from a 16-shot draw, so
        // submission timing is not predictable from the request timing.
        let counts = self
            .entropy
            .draw(JITTER_SHOTS)
            .await
            .map_err(|e| PipelineError::Entropy(e.to_string()))?;
        let delay_s = counts.fraction_ones() * JITTER_MAX_S;
        state.log(
            "ExecutionAgent",
            &format!(
                "Timing jitter: {:.2}s ({}/{} ones, source {})",
                delay_s,
                counts.ones,
                counts.total(),
                self.entropy.name()
            ),
        );
        tokio::time::sleep(Duration::from_secs_f64(delay_s)).await;

        Ok(())
    }
}
