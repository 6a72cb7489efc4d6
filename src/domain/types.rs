use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Single tradeable asset in the rebalancing universe.
///
/// Immutable once the universe is fixed for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    /// Annualized expected return.
    pub expected_return: f64,
    /// Guardrail: maximum position weight in (0, 1].
    pub max_weight: f64,
    /// Current portfolio weight, >= 0.
    pub current_weight: f64,
}

impl Asset {
    pub fn new(symbol: &str, expected_return: f64, max_weight: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            expected_return,
            max_weight,
            current_weight: 0.0,
        }
    }
}

/// Which volatility model produced a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityModel {
    Garch,
    EwmaFallback,
}

impl fmt::Display for VolatilityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityModel::Garch => write!(f, "garch"),
            VolatilityModel::EwmaFallback => write!(f, "ewma_fallback"),
        }
    }
}

/// Result of volatility forecasting for a single asset.
///
/// Stationarity invariant: `model == Garch` implies `persistence < 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityForecast {
    pub symbol: String,
    /// Naive annualized sample std.
    pub historical_vol: f64,
    /// One-step-ahead forecast, annualized.
    pub forecast_vol: f64,
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    /// alpha + beta.
    pub persistence: f64,
    pub log_likelihood: f64,
    pub model: VolatilityModel,
}

impl VolatilityForecast {
    /// EWMA fallback result carrying only the two vol estimates.
    pub fn fallback(symbol: &str, historical_vol: f64, forecast_vol: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            historical_vol,
            forecast_vol,
            omega: 0.0,
            alpha: 0.0,
            beta: 0.0,
            persistence: 0.0,
            log_likelihood: 0.0,
            model: VolatilityModel::EwmaFallback,
        }
    }
}

/// Outcome of the binary selection + continuous weight stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// symbol -> 0/1 selection bit.
    pub allocation: BTreeMap<String, u8>,
    /// symbol -> normalized weight; zero for unselected assets.
    pub weights: BTreeMap<String, f64>,
    pub expected_return: f64,
    /// sqrt(w' Sigma w).
    pub expected_risk: f64,
    /// Objective value of the best binary sample.
    pub energy: f64,
    pub solver_name: String,
    pub solver_time_s: f64,
    pub feasible: bool,
    pub reason: String,
}

impl OptimizationResult {
    pub fn selected_symbols(&self) -> Vec<&str> {
        self.allocation
            .iter()
            .filter(|(_, v)| **v == 1)
            .map(|(s, _)| s.as_str())
            .collect()
    }

    pub fn num_selected(&self) -> usize {
        self.allocation.values().filter(|v| **v == 1).count()
    }

    pub fn max_weight(&self) -> f64 {
        self.weights.values().cloned().fold(0.0, f64::max)
    }
}

/// Estimated market impact for a single swap leg.
///
/// Invariant: `min_out_usd == order_size_usd * (1 - total_slippage_pct)`,
/// clamped at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageEstimate {
    pub symbol: String,
    pub order_size_usd: f64,
    pub daily_volume_usd: f64,
    /// order_size / daily_volume.
    pub volume_fraction: f64,
    /// alpha * fraction^beta.
    pub raw_impact_pct: f64,
    pub safety_margin_pct: f64,
    /// raw impact + safety margin.
    pub total_slippage_pct: f64,
    pub min_out_usd: f64,
    /// min_out converted to on-chain base units.
    pub min_out_base_units: u64,
    pub alpha: f64,
    pub beta: f64,
    pub exceeds_max_impact: bool,
}

/// Terminal (and intermediate) pipeline statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Approved,
    Rejected,
    Error,
    PendingApproval,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Pending => write!(f, "pending"),
            PipelineStatus::Approved => write!(f, "approved"),
            PipelineStatus::Rejected => write!(f, "rejected"),
            PipelineStatus::Error => write!(f, "error"),
            PipelineStatus::PendingApproval => write!(f, "pending_approval"),
        }
    }
}
