//! Asset-selection objective encoded as a binary quadratic model.
//!
//! E(x) = lambda_risk * x' Sigma x
//!      - lambda_return * mu' x
//!      + lambda_budget * (sum_i x_i - K)^2
//!
//! Because x_i in {0,1} implies x_i^2 = x_i, the diagonal risk term and the
//! budget expansion fold into the linear biases; the quadratic couplings keep
//! only i < j entries. The build is fully deterministic: same inputs, byte
//! identical model.

use crate::domain::errors::PipelineError;
use nalgebra::DMatrix;
use std::collections::BTreeMap;
use tracing::info;

/// Coupling weights for the selection objective.
#[derive(Debug, Clone, Copy)]
pub struct QuboParams {
    pub lambda_return: f64,
    pub lambda_risk: f64,
    pub lambda_budget: f64,
    /// K: how many assets the budget penalty targets.
    pub target_assets: usize,
}

impl QuboParams {
    /// Defaults derived from the user's risk tolerance for an n-asset
    /// universe: a risk-averse user gets a heavier risk coupling and a
    /// smaller target subset.
    pub fn for_risk_tolerance(risk_tolerance: f64, n: usize) -> Self {
        let target = ((n as f64 * risk_tolerance) as usize + 1).clamp(2, n.max(2));
        Self {
            lambda_return: 1.0,
            lambda_risk: (1.0 - risk_tolerance).max(0.1),
            lambda_budget: 2.0,
            target_assets: target.min(n.max(1)),
        }
    }
}

/// Binary quadratic model over `num_vars` selection bits.
///
/// Quadratic keys are `(i, j)` with `i < j`; both indices are always inside
/// `[0, num_vars)`. The ordered map makes iteration deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Bqm {
    pub linear: Vec<f64>,
    pub quadratic: BTreeMap<(usize, usize), f64>,
    pub offset: f64,
}

impl Bqm {
    pub fn num_vars(&self) -> usize {
        self.linear.len()
    }

    /// Objective value of a binary assignment.
    pub fn energy(&self, bits: &[u8]) -> f64 {
        debug_assert_eq!(bits.len(), self.num_vars());
        let mut e = self.offset;
        for (i, &h) in self.linear.iter().enumerate() {
            if bits[i] == 1 {
                e += h;
            }
        }
        for (&(i, j), &coupling) in &self.quadratic {
            if bits[i] == 1 && bits[j] == 1 {
                e += coupling;
            }
        }
        e
    }
}

/// Couplings below this magnitude are dropped from the model.
const COUPLING_EPS: f64 = 1e-12;

/// Build the selection BQM from expected returns and the covariance matrix.
pub fn build_selection_bqm(
    mu: &[f64],
    cov: &DMatrix<f64>,
    params: &QuboParams,
) -> Result<Bqm, PipelineError> {
    let n = mu.len();
    if n == 0 {
        return Err(PipelineError::InvalidInput("empty universe".to_string()));
    }
    if cov.nrows() != n || cov.ncols() != n {
        return Err(PipelineError::InvalidInput(format!(
            "covariance is {}x{} for {} assets",
            cov.nrows(),
            cov.ncols(),
            n
        )));
    }

    let k = params.target_assets as f64;

    // Linear biases: return term, risk diagonal (x_i^2 = x_i), and the
    // per-variable part of the budget expansion.
    let mut linear = Vec::with_capacity(n);
    for i in 0..n {
        let h = -params.lambda_return * mu[i]
            + params.lambda_risk * cov[(i, i)]
            + params.lambda_budget * (1.0 - 2.0 * k);
        linear.push(h);
    }

    // Quadratic couplings: off-diagonal risk (the factor 2 collapses the
    // symmetric pair into the upper triangle) plus the budget coupling.
    let mut quadratic = BTreeMap::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let coupling = 2.0 * params.lambda_risk * cov[(i, j)] + 2.0 * params.lambda_budget;
            if coupling.abs() > COUPLING_EPS {
                quadratic.insert((i, j), coupling);
            }
        }
    }

    let bqm = Bqm {
        linear,
        quadratic,
        offset: params.lambda_budget * k * k,
    };

    info!(
        "Built QUBO: {} variables, {} quadratic terms, target_assets={}",
        n,
        bqm.quadratic.len(),
        params.target_assets
    );
    Ok(bqm)
}
