//! Risk stage: the seven deterministic pre-flight checks and the
//! approval-threshold policy. These mirror the on-chain execution guardrails;
//! a plan that fails here would abort on-chain anyway, so it never leaves the
//! process.

use crate::application::agents::PipelineState;
use crate::domain::errors::PipelineError;
use crate::domain::risk::{RiskChecks, RiskLimits};
use crate::domain::types::PipelineStatus;

pub struct RiskAgent {
    limits: RiskLimits,
}

impl RiskAgent {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub async fn run(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        state.log("RiskAgent", "Running pre-flight checks ...");

        let Some(opt) = state.optimization_result.clone() else {
            state.risk_approved = false;
            state.risk_report = "No optimization result to evaluate.".to_string();
            state.status = PipelineStatus::Error;
            return Ok(());
        };
        let limits = &self.limits;

        // All seven checks are computed; none short-circuits.
        let max_weight = opt.max_weight();
        let any_exceeds = state
            .slippage_estimates
            .values()
            .any(|e| e.exceeds_max_impact);

        let checks = RiskChecks {
            optimizer_feasible: opt.feasible,
            position_size_ok: max_weight <= limits.max_position_weight,
            risk_within_limit: opt.expected_risk <= limits.max_portfolio_risk,
            return_sufficient: opt.expected_return >= limits.min_expected_return,
            solver_fast_enough: opt.solver_time_s <= limits.max_solver_time_s,
            assets_selected: opt.num_selected() >= 1,
            // Absent estimates pass: no model is a graceful pass, not a veto.
            slippage_acceptable: !any_exceeds,
        };

        if !checks.optimizer_feasible {
            state.log("RiskAgent", &format!("Optimizer infeasible: {}", opt.reason));
        }
        if !checks.position_size_ok {
            state.log(
                "RiskAgent",
                &format!(
                    "Position too large: {:.2}% > {:.2}%",
                    max_weight * 100.0,
                    limits.max_position_weight * 100.0
                ),
            );
        }
        if !checks.risk_within_limit {
            state.log(
                "RiskAgent",
                &format!(
                    "Portfolio risk too high: {:.4} > {:.4}",
                    opt.expected_risk, limits.max_portfolio_risk
                ),
            );
        }
        if !checks.return_sufficient {
            state.log(
                "RiskAgent",
                &format!(
                    "Expected return too low: {:.4} < {:.4}",
                    opt.expected_return, limits.min_expected_return
                ),
            );
        }
        if !checks.solver_fast_enough {
            state.log(
                "RiskAgent",
                &format!(
                    "Solver too slow: {:.3}s > {:.1}s",
                    opt.solver_time_s, limits.max_solver_time_s
                ),
            );
        }
        if !checks.assets_selected {
            state.log("RiskAgent", "No assets selected");
        }
        if !checks.slippage_acceptable {
            let bad: Vec<&String> = state
                .slippage_estimates
                .iter()
                .filter(|(_, e)| e.exceeds_max_impact)
                .map(|(s, _)| s)
                .collect();
            state.log("RiskAgent", &format!("Market impact too high for: {:?}", bad));
        }

        let all_passed = checks.all_passed();
        state.risk_checks = Some(checks);
        state.risk_approved = all_passed;

        let mut report_lines = vec!["Risk pre-flight checks:".to_string()];
        for (name, passed) in checks.iter() {
            report_lines.push(format!(
                "  [{}] {}",
                if passed { "PASS" } else { "FAIL" },
                name
            ));
        }
        state
            .reasoning
            .insert("RiskAgent".to_string(), report_lines.join("\n"));

        if all_passed {
            // Approval-threshold policy: large or risky trades go to a human.
            let mut reasons = Vec::new();

            let active_weight: f64 = opt.weights.values().filter(|w| **w > 0.0).sum();
            let estimated_value = active_weight * limits.max_daily_volume_usd;
            if estimated_value > limits.approval_threshold_usd {
                reasons.push(format!(
                    "Estimated trade value ${:.0} > threshold ${:.0}",
                    estimated_value, limits.approval_threshold_usd
                ));
            }
            if opt.expected_risk > limits.approval_risk_threshold {
                reasons.push(format!(
                    "Portfolio risk sigma={:.4} > approval threshold {:.4}",
                    opt.expected_risk, limits.approval_risk_threshold
                ));
            }

            if reasons.is_empty() {
                state.status = PipelineStatus::Approved;
                state.risk_report = "All 7 checks passed. Transaction approved.".to_string();
                state.log("RiskAgent", "All checks passed - APPROVED for on-chain execution");
            } else {
                state.status = PipelineStatus::PendingApproval;
                state.requires_approval = true;
                state.risk_report = format!(
                    "All 7 checks passed but requires human approval: {}",
                    reasons.join("; ")
                );
                state.log(
                    "RiskAgent",
                    &format!("PENDING APPROVAL - {}", reasons.join("; ")),
                );
                state.approval_reasons = reasons;
            }
        } else {
            let failed = checks.failed_names();
            state.status = PipelineStatus::Rejected;
            state.risk_report = format!("Failed checks: {:?}", failed);
            state.log("RiskAgent", &format!("REJECTED - failed: {:?}", failed));
        }

        Ok(())
    }
}
