//! Forward-looking covariance assembly (diagonal GARCH, "DCC-lite").
//!
//! Per-asset GARCH vols on the diagonal, a static correlation matrix from
//! row-standardized returns in the middle: Sigma = D * R * D, annualized,
//! then symmetrized and PSD-corrected. Also hosts the return calibration and
//! the volatility-target shrinkage applied before the QUBO stage.

use crate::application::market_data::garch::{self, DAYS_PER_YEAR};
use crate::domain::errors::PipelineError;
use crate::domain::types::{VolatilityForecast, VolatilityModel};
use nalgebra::DMatrix;
use statrs::statistics::Statistics;
use tracing::{info, warn};

/// Synthetic daily vol substituted when an asset has fewer than 2 returns.
const FALLBACK_DAILY_VOL: f64 = 0.02;

/// Fallback annualized expected return for degenerate series.
pub const FALLBACK_EXPECTED_RETURN: f64 = 0.15;

/// Center of the calibrated expected-return band.
pub const RETURN_CENTER: f64 = 0.15;

/// Width of the calibrated expected-return band.
pub const RETURN_SPREAD: f64 = 0.25;

/// Build the GARCH-enhanced annualized covariance matrix from an
/// (n_assets x n_days) return matrix.
pub fn forecast_covariance(
    returns: &[Vec<f64>],
    symbols: &[String],
) -> Result<(DMatrix<f64>, Vec<VolatilityForecast>), PipelineError> {
    let n = returns.len();
    if n == 0 || n != symbols.len() {
        return Err(PipelineError::InvalidInput(format!(
            "return matrix has {} rows for {} symbols",
            n,
            symbols.len()
        )));
    }
    let t = returns[0].len();
    if returns.iter().any(|row| row.len() != t) {
        return Err(PipelineError::InvalidInput(
            "return matrix rows have unequal lengths".to_string(),
        ));
    }
    if returns.iter().flatten().any(|r| !r.is_finite()) {
        return Err(PipelineError::InvalidInput(
            "return matrix contains non-finite values".to_string(),
        ));
    }

    // Step 1: univariate vol forecast per asset, converted back to daily.
    let mut daily_vols = vec![0.0f64; n];
    let mut forecasts = Vec::with_capacity(n);
    for (i, row) in returns.iter().enumerate() {
        let fc = if row.len() < 2 {
            let annual = FALLBACK_DAILY_VOL * DAYS_PER_YEAR.sqrt();
            VolatilityForecast::fallback(&symbols[i], annual, annual)
        } else {
            garch::fit_garch(row, &symbols[i])
        };
        let daily = fc.forecast_vol / DAYS_PER_YEAR.sqrt();
        daily_vols[i] = if daily > 1e-12 { daily } else { FALLBACK_DAILY_VOL };
        forecasts.push(fc);
    }

    // Step 2: static correlation from standardized returns.
    let corr = correlation_matrix(returns);

    // Step 3: Sigma = D * R * D, annualized.
    let mut cov = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            cov[(i, j)] = daily_vols[i] * corr[(i, j)] * daily_vols[j] * DAYS_PER_YEAR;
        }
    }

    ensure_psd(&mut cov);

    let garch_count = forecasts
        .iter()
        .filter(|f| f.model == VolatilityModel::Garch)
        .count();
    info!(
        "GARCH covariance: {} assets ({} garch, {} ewma), min eigenvalue {:.2e}",
        n,
        garch_count,
        n - garch_count,
        min_eigenvalue(&cov)
    );

    Ok((cov, forecasts))
}

/// Pearson correlation of row-standardized returns; symmetrized with a unit
/// diagonal. Degenerate rows (zero variance or too short) correlate with
/// nothing.
fn correlation_matrix(returns: &[Vec<f64>]) -> DMatrix<f64> {
    let n = returns.len();
    let t = returns[0].len();
    let mut corr = DMatrix::identity(n, n);
    if t < 2 {
        return corr;
    }

    let means: Vec<f64> = returns.iter().map(|row| row.iter().cloned().mean()).collect();
    let stds: Vec<f64> = returns.iter().map(|row| row.iter().cloned().std_dev()).collect();

    for i in 0..n {
        for j in (i + 1)..n {
            if stds[i] <= 1e-12 || stds[j] <= 1e-12 {
                continue;
            }
            let cov_ij: f64 = returns[i]
                .iter()
                .zip(&returns[j])
                .map(|(a, b)| (a - means[i]) * (b - means[j]))
                .sum::<f64>()
                / (t as f64 - 1.0);
            let rho = (cov_ij / (stds[i] * stds[j])).clamp(-1.0, 1.0);
            corr[(i, j)] = rho;
            corr[(j, i)] = rho;
        }
    }
    corr
}

/// Smallest eigenvalue of a symmetric matrix.
pub fn min_eigenvalue(m: &DMatrix<f64>) -> f64 {
    m.clone()
        .symmetric_eigen()
        .eigenvalues
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min)
}

/// Symmetrize, then shift the spectrum up if any eigenvalue is negative:
/// Sigma <- Sigma - 1.1 * lambda_min * I.
pub fn ensure_psd(cov: &mut DMatrix<f64>) {
    let n = cov.nrows();
    let sym = (cov.clone() + cov.transpose()) * 0.5;
    *cov = sym;

    let lambda_min = min_eigenvalue(cov);
    if lambda_min < 0.0 {
        warn!("covariance not PSD (min eigenvalue {:.3e}), shifting spectrum", lambda_min);
        for i in 0..n {
            cov[(i, i)] -= 1.1 * lambda_min;
        }
    }
}

/// Annualized expected returns from daily log returns: mean x 365.
/// Rows with fewer than 2 observations get the fallback value.
pub fn estimate_annualized_returns(returns: &[Vec<f64>]) -> Vec<f64> {
    returns
        .iter()
        .map(|row| {
            if row.len() < 2 {
                FALLBACK_EXPECTED_RETURN
            } else {
                row.iter().cloned().mean() * DAYS_PER_YEAR
            }
        })
        .collect()
}

/// Short-window annualized means are unstable; preserve the ranking but map
/// onto [center - spread/2, center + spread/2]. A degenerate range maps
/// everything to the center.
pub fn calibrate_returns(raw: &[f64]) -> Vec<f64> {
    let lo = raw.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(hi - lo).is_finite() || hi - lo < 1e-10 {
        return vec![RETURN_CENTER; raw.len()];
    }
    let half = RETURN_SPREAD / 2.0;
    raw.iter()
        .map(|r| (RETURN_CENTER - half) + (r - lo) / (hi - lo) * RETURN_SPREAD)
        .collect()
}

/// Rescale the covariance so the average diagonal vol hits the target
/// annualized level.
pub fn shrink_to_target_vol(cov: &mut DMatrix<f64>, target_avg_vol: f64) {
    let n = cov.nrows();
    if n == 0 {
        return;
    }
    let avg_vol: f64 = (0..n).map(|i| cov[(i, i)].max(0.0).sqrt()).sum::<f64>() / n as f64;
    if avg_vol <= 1e-12 {
        return;
    }
    let scale = (target_avg_vol / avg_vol).powi(2);
    *cov *= scale;
}
