//! Guardrail check set and limits for the risk state machine.
//!
//! The seven checks are a fixed struct rather than a string-keyed map so the
//! compiler enforces completeness; iteration order is the definition order.

use serde::{Deserialize, Serialize};

/// Result of the seven deterministic pre-flight checks.
///
/// Every check is always computed; none short-circuits, so callers receive
/// the full map even when an early check fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskChecks {
    pub optimizer_feasible: bool,
    pub position_size_ok: bool,
    pub risk_within_limit: bool,
    pub return_sufficient: bool,
    pub solver_fast_enough: bool,
    pub assets_selected: bool,
    pub slippage_acceptable: bool,
}

impl RiskChecks {
    pub const NAMES: [&'static str; 7] = [
        "optimizer_feasible",
        "position_size_ok",
        "risk_within_limit",
        "return_sufficient",
        "solver_fast_enough",
        "assets_selected",
        "slippage_acceptable",
    ];

    /// Checks in definition order, paired with their names.
    pub fn iter(&self) -> [(&'static str, bool); 7] {
        [
            ("optimizer_feasible", self.optimizer_feasible),
            ("position_size_ok", self.position_size_ok),
            ("risk_within_limit", self.risk_within_limit),
            ("return_sufficient", self.return_sufficient),
            ("solver_fast_enough", self.solver_fast_enough),
            ("assets_selected", self.assets_selected),
            ("slippage_acceptable", self.slippage_acceptable),
        ]
    }

    pub fn all_passed(&self) -> bool {
        self.iter().iter().all(|(_, ok)| *ok)
    }

    pub fn failed_names(&self) -> Vec<&'static str> {
        self.iter()
            .iter()
            .filter(|(_, ok)| !*ok)
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Hard guardrail limits plus the approval-threshold policy.
///
/// Constructed once from `Config`; nothing else in the crate hard-codes a
/// limit, so there is a single source of truth for these constants.
#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    /// No single position above this weight.
    pub max_position_weight: f64,
    /// Annualized sigma cap on the whole portfolio.
    pub max_portfolio_risk: f64,
    /// Floor on the portfolio's expected return.
    pub min_expected_return: f64,
    /// Solver wall-time budget.
    pub max_solver_time_s: f64,
    /// Worst-case notional proxy used for the approval-value estimate.
    pub max_daily_volume_usd: f64,
    /// Trades estimated above this value need human sign-off.
    pub approval_threshold_usd: f64,
    /// Portfolios riskier than this need human sign-off.
    pub approval_risk_threshold: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_weight: 0.40,
            max_portfolio_risk: 0.45,
            min_expected_return: 0.01,
            max_solver_time_s: 5.0,
            max_daily_volume_usd: 1_000_000.0,
            approval_threshold_usd: 50_000.0,
            approval_risk_threshold: 0.30,
        }
    }
}
