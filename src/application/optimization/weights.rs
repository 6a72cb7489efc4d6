//! Continuous weights for the QUBO-selected subset.
//!
//! Analytical tangency direction (Sigma^-1 mu) with min-variance and uniform
//! fallbacks, projected onto the bounded simplex, then floored so every
//! selected asset keeps a meaningful allocation. The selection already
//! decided membership; this stage only sizes the positions.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

/// Iteration caps for the alternating projection and the floor repair loop.
const PROJECTION_ITERS: usize = 50;
const FLOOR_REPAIR_ITERS: usize = 20;

#[derive(Debug, Clone)]
pub struct WeightSolution {
    /// Weights over the selected indices, in the same order as the input.
    pub weights: Vec<f64>,
    /// w' mu on the sub-universe.
    pub expected_return: f64,
    /// sqrt(w' Sigma w) on the sub-universe.
    pub expected_risk: f64,
}

/// Compute bounded simplex weights for the selected sub-universe.
///
/// `selected` indexes into the full universe; `mu`, `cov` and `max_weights`
/// are full-universe views. `min_weight` is the diversification floor applied
/// when more than one asset is selected.
pub fn optimize_weights(
    selected: &[usize],
    mu: &[f64],
    cov: &DMatrix<f64>,
    max_weights: &[f64],
    min_weight: f64,
) -> WeightSolution {
    let n_sel = selected.len();
    if n_sel == 0 {
        return WeightSolution {
            weights: Vec::new(),
            expected_return: 0.0,
            expected_risk: 0.0,
        };
    }

    let sub_mu = DVector::from_iterator(n_sel, selected.iter().map(|&i| mu[i]));
    let sub_cov = DMatrix::from_fn(n_sel, n_sel, |r, c| cov[(selected[r], selected[c])]);
    let upper: Vec<f64> = selected.iter().map(|&i| max_weights[i]).collect();

    // Tangency direction Sigma^-1 mu; min-variance Sigma^-1 1 when the
    // tangency points entirely short; uniform when Sigma is singular.
    let raw: Vec<f64> = match sub_cov.clone().try_inverse() {
        Some(inv) => {
            let tangency = &inv * &sub_mu;
            if tangency.iter().all(|w| *w <= 0.0) {
                debug!("tangency direction fully non-positive, using min-variance");
                (&inv * DVector::from_element(n_sel, 1.0)).iter().cloned().collect()
            } else {
                tangency.iter().cloned().collect()
            }
        }
        None => {
            warn!("singular covariance on selected subset, using uniform weights");
            vec![1.0; n_sel]
        }
    };

    let mut w = project_bounded_simplex(&raw, &upper);

    // The tangency portfolio can be very concentrated when assets are
    // correlated. The selection stage already decided these assets belong in
    // the portfolio, so enforce the floor and re-project.
    if n_sel > 1 && w.iter().any(|wi| *wi < min_weight) {
        let equal = 1.0 / n_sel as f64;
        let blended: Vec<f64> = w.iter().map(|wi| 0.5 * wi + 0.5 * equal).collect();
        w = project_bounded_simplex(&blended, &upper);

        if w.iter().any(|wi| *wi < min_weight) {
            for wi in &mut w {
                *wi = wi.max(min_weight);
            }
            let mut excess: f64 = w.iter().sum::<f64>() - 1.0;
            if excess > 0.0 {
                for _ in 0..FLOOR_REPAIR_ITERS {
                    let idx_max = argmax(&w);
                    let reduce = excess.min(w[idx_max] - min_weight);
                    w[idx_max] -= reduce;
                    excess -= reduce;
                    if excess.abs() < 1e-10 {
                        break;
                    }
                }
            }
            let total: f64 = w.iter().sum();
            if total > 1e-12 {
                for wi in &mut w {
                    *wi /= total;
                }
            }
        }
    }

    let wv = DVector::from_vec(w.clone());
    let expected_return = wv.dot(&sub_mu);
    let expected_risk = (&wv.transpose() * &sub_cov * &wv)[(0, 0)].max(0.0).sqrt();

    WeightSolution {
        weights: w,
        expected_return,
        expected_risk,
    }
}

/// Project onto `{w : sum w = 1, 0 <= w_i <= ub_i}` by alternating between
/// the box and the affine constraint, redistributing excess mass uniformly
/// across non-capped coordinates.
pub fn project_bounded_simplex(raw: &[f64], upper: &[f64]) -> Vec<f64> {
    let n = raw.len();

    // Normalize before clipping to preserve relative ratios.
    let mut w: Vec<f64> = raw.iter().map(|x| x.max(0.0)).collect();
    let total: f64 = w.iter().sum();
    if total > 1e-12 {
        for wi in &mut w {
            *wi /= total;
        }
    } else {
        w = vec![1.0 / n as f64; n];
    }

    for _ in 0..PROJECTION_ITERS {
        let mut clamped: Vec<f64> = w
            .iter()
            .zip(upper)
            .map(|(wi, ub)| wi.clamp(0.0, *ub))
            .collect();
        let excess: f64 = clamped.iter().sum::<f64>() - 1.0;
        if excess.abs() < 1e-10 {
            w = clamped;
            break;
        }

        let free: Vec<usize> = if excess > 0.0 {
            clamped
                .iter()
                .zip(upper)
                .enumerate()
                .filter(|(_, (wi, ub))| **wi < **ub - 1e-10)
                .map(|(i, _)| i)
                .collect()
        } else {
            clamped
                .iter()
                .enumerate()
                .filter(|(_, wi)| **wi > 1e-10)
                .map(|(i, _)| i)
                .collect()
        };

        if free.is_empty() {
            // Everything at a boundary: scale proportionally and stop.
            let total: f64 = clamped.iter().sum();
            if total > 1e-12 {
                for wi in &mut clamped {
                    *wi /= total;
                }
            }
            w = clamped;
            break;
        }

        let share = excess / free.len() as f64;
        for &i in &free {
            clamped[i] -= share;
        }
        w = clamped;
    }

    // Final safety: re-clip and renormalize.
    for (wi, ub) in w.iter_mut().zip(upper) {
        *wi = wi.clamp(0.0, *ub);
    }
    let total: f64 = w.iter().sum();
    if (total - 1.0).abs() > 1e-8 && total > 1e-12 {
        for wi in &mut w {
            *wi /= total;
        }
    }
    w
}

fn argmax(values: &[f64]) -> usize {
    let mut idx = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[idx] {
            idx = i;
        }
    }
    idx
}
