//! The three-agent decision pipeline: Market gathers the universe and its
//! moments, Execution selects and sizes positions, Risk runs the pre-flight
//! guardrails. Agents mutate a shared `PipelineState` exactly once each, in
//! forward order.

pub mod execution;
pub mod market;
pub mod risk;

use crate::domain::risk::RiskChecks;
use crate::domain::types::{
    Asset, OptimizationResult, PipelineStatus, SlippageEstimate, VolatilityForecast,
};
use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use std::collections::BTreeMap;
use tracing::info;

/// Mutable state carried through the pipeline.
///
/// Created per request; each agent writes its section once; nothing mutates
/// it after the risk stage emits a terminal status.
#[derive(Debug, Clone)]
pub struct PipelineState {
    // Inputs
    pub user_id: String,
    /// 0 = conservative, 1 = aggressive.
    pub risk_tolerance: f64,
    pub use_mock: bool,

    // Market stage
    pub assets: Vec<Asset>,
    pub cov: Option<DMatrix<f64>>,
    pub vol_forecasts: Vec<VolatilityForecast>,
    pub market_summary: String,
    pub market_timestamp: Option<DateTime<Utc>>,

    // Execution stage
    pub optimization_result: Option<OptimizationResult>,
    pub slippage_estimates: BTreeMap<String, SlippageEstimate>,

    // Risk stage
    pub risk_checks: Option<RiskChecks>,
    pub risk_approved: bool,
    pub risk_report: String,

    // Per-agent explanation text.
    pub reasoning: BTreeMap<String, String>,

    // Final
    pub status: PipelineStatus,
    pub requires_approval: bool,
    pub approval_reasons: Vec<String>,
    /// Append-only agent log.
    pub logs: Vec<String>,
}

impl PipelineState {
    pub fn new(user_id: &str, risk_tolerance: f64, use_mock: bool) -> Self {
        Self {
            user_id: user_id.to_string(),
            risk_tolerance: risk_tolerance.clamp(0.0, 1.0),
            use_mock,
            assets: Vec::new(),
            cov: None,
            vol_forecasts: Vec::new(),
            market_summary: String::new(),
            market_timestamp: None,
            optimization_result: None,
            slippage_estimates: BTreeMap::new(),
            risk_checks: None,
            risk_approved: false,
            risk_report: String::new(),
            reasoning: BTreeMap::new(),
            status: PipelineStatus::Pending,
            requires_approval: false,
            approval_reasons: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// Append an agent log line and mirror it to the tracing output.
    pub fn log(&mut self, agent: &str, msg: &str) {
        let entry = format!("[{agent}] {msg}");
        info!("{}", entry);
        self.logs.push(entry);
    }

    /// JSON snapshot of the decision (for approval records and CLI output).
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "user_id": self.user_id,
            "risk_tolerance": self.risk_tolerance,
            "status": self.status,
            "market_summary": self.market_summary,
            "optimization_result": self.optimization_result,
            "slippage_estimates": self.slippage_estimates,
            "risk_checks": self.risk_checks,
            "risk_approved": self.risk_approved,
            "risk_report": self.risk_report,
            "requires_approval": self.requires_approval,
            "approval_reasons": self.approval_reasons,
            "reasoning": self.reasoning,
            "logs": self.logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_clamps_risk_tolerance() {
        assert_eq!(PipelineState::new("u", 1.7, true).risk_tolerance, 1.0);
        assert_eq!(PipelineState::new("u", -0.3, true).risk_tolerance, 0.0);
    }

    #[test]
    fn test_log_appends() {
        let mut state = PipelineState::new("u", 0.5, true);
        state.log("MarketAgent", "hello");
        state.log("RiskAgent", "world");
        assert_eq!(state.logs.len(), 2);
        assert!(state.logs[0].starts_with("[MarketAgent]"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let state = PipelineState::new("u", 0.5, true);
        let snapshot = state.snapshot();
        assert_eq!(snapshot["status"], "pending");
        assert_eq!(snapshot["user_id"], "u");
    }
}
