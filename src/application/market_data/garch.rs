//! GARCH(1,1) volatility forecasting.
//!
//! sigma2_t = omega + alpha * eps2_{t-1} + beta * sigma2_{t-1}
//!
//! Captures volatility clustering: large moves tend to be followed by more
//! large moves, which a flat sample std misses. Fitted by maximum likelihood
//! (Nelder-Mead over the three parameters, returns scaled x100 for
//! conditioning). Falls back to EWMA when the series is too short, the fit
//! fails, or the fitted process is non-stationary (alpha + beta >= 1).

use crate::domain::types::{VolatilityForecast, VolatilityModel};
use statrs::statistics::Statistics;
use tracing::{debug, info, warn};

/// Trading-day annualization factor for crypto (24/7 markets).
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Minimum observations before a GARCH fit is attempted.
const MIN_GARCH_OBS: usize = 20;

/// EWMA decay span for the fallback estimator.
const EWMA_SPAN: usize = 10;

/// Fit GARCH(1,1) to a daily log-return series and produce a one-step
/// annualized volatility forecast.
pub fn fit_garch(returns: &[f64], symbol: &str) -> VolatilityForecast {
    let hist_vol = if returns.len() >= 2 {
        returns.iter().cloned().std_dev() * DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    if returns.len() < MIN_GARCH_OBS {
        debug!(
            "[{}] too few observations for GARCH ({}), using EWMA",
            symbol,
            returns.len()
        );
        return VolatilityForecast::fallback(symbol, hist_vol, ewma_volatility(returns));
    }

    // Scale to percentage returns for numerical stability of the likelihood.
    let scaled: Vec<f64> = returns.iter().map(|r| r * 100.0).collect();
    let mean = scaled.iter().cloned().mean();
    let eps: Vec<f64> = scaled.iter().map(|r| r - mean).collect();

    match fit_mle(&eps) {
        Some(fit) if fit.persistence() < 1.0 => {
            // One-step variance forecast, then back from pct^2 to daily.
            let daily_var = fit.next_sigma2 / (100.0 * 100.0);
            let annual_vol = (daily_var * DAYS_PER_YEAR).sqrt();

            info!(
                "[{}] GARCH(1,1): omega={:.6}, alpha={:.4}, beta={:.4}, persistence={:.4}, sigma_forecast={:.4}",
                symbol,
                fit.omega,
                fit.alpha,
                fit.beta,
                fit.persistence(),
                annual_vol
            );

            VolatilityForecast {
                symbol: symbol.to_string(),
                historical_vol: hist_vol,
                forecast_vol: annual_vol,
                omega: fit.omega,
                alpha: fit.alpha,
                beta: fit.beta,
                persistence: fit.persistence(),
                log_likelihood: fit.log_likelihood,
                model: VolatilityModel::Garch,
            }
        }
        Some(fit) => {
            warn!(
                "[{}] GARCH non-stationary (persistence {:.4} >= 1), falling back to EWMA",
                symbol,
                fit.persistence()
            );
            VolatilityForecast::fallback(symbol, hist_vol, ewma_volatility(returns))
        }
        None => {
            warn!("[{}] GARCH fit failed, falling back to EWMA", symbol);
            VolatilityForecast::fallback(symbol, hist_vol, ewma_volatility(returns))
        }
    }
}

/// Exponentially-weighted moving average volatility, annualized.
///
/// The fallback when GARCH cannot fit. Most recent observations carry the
/// highest weight.
pub fn ewma_volatility(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let decay = 2.0 / (EWMA_SPAN as f64 + 1.0);
    let n = returns.len();
    let mean = returns.iter().cloned().mean();

    let mut weights: Vec<f64> = (0..n).map(|i| (1.0 - decay).powi((n - 1 - i) as i32)).collect();
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }

    let ewma_var: f64 = weights
        .iter()
        .zip(returns)
        .map(|(w, r)| w * (r - mean).powi(2))
        .sum();
    (ewma_var * DAYS_PER_YEAR).sqrt()
}

struct GarchFit {
    omega: f64,
    alpha: f64,
    beta: f64,
    log_likelihood: f64,
    /// One-step-ahead conditional variance left by the recursion.
    next_sigma2: f64,
}

impl GarchFit {
    fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }
}

/// Negative log-likelihood of a GARCH(1,1) under Gaussian innovations.
/// Returns (nll, one-step-ahead sigma2), or None on an invalid parameter
/// point.
fn neg_log_likelihood(params: &[f64; 3], eps: &[f64]) -> Option<(f64, f64)> {
    let [omega, alpha, beta] = *params;
    if omega <= 0.0 || alpha < 0.0 || beta < 0.0 || !omega.is_finite() {
        return None;
    }

    let sample_var = eps.iter().map(|e| e * e).sum::<f64>() / eps.len() as f64;
    let mut sigma2 = sample_var.max(1e-12);
    let mut nll = 0.0;
    for &e in eps {
        nll += 0.5 * ((2.0 * std::f64::consts::PI).ln() + sigma2.ln() + e * e / sigma2);
        sigma2 = omega + alpha * e * e + beta * sigma2;
        if !sigma2.is_finite() || sigma2 <= 0.0 {
            return None;
        }
    }
    if !nll.is_finite() {
        return None;
    }
    Some((nll, sigma2))
}

/// Maximum-likelihood fit via Nelder-Mead on (omega, alpha, beta).
fn fit_mle(eps: &[f64]) -> Option<GarchFit> {
    let sample_var = eps.iter().map(|e| e * e).sum::<f64>() / eps.len() as f64;
    let start = [0.05 * sample_var.max(1e-8), 0.10, 0.85];

    let objective = |p: &[f64; 3]| neg_log_likelihood(p, eps).map(|(nll, _)| nll);
    let best = nelder_mead(objective, start, 500, 1e-9)?;

    let (nll, next_sigma2) = neg_log_likelihood(&best, eps)?;
    Some(GarchFit {
        omega: best[0],
        alpha: best[1],
        beta: best[2],
        log_likelihood: -nll,
        next_sigma2,
    })
}

/// Minimal Nelder-Mead over R^3 with invalid points treated as +inf.
fn nelder_mead<F>(f: F, start: [f64; 3], max_iter: usize, tol: f64) -> Option<[f64; 3]>
where
    F: Fn(&[f64; 3]) -> Option<f64>,
{
    const ALPHA: f64 = 1.0; // reflection
    const GAMMA: f64 = 2.0; // expansion
    const RHO: f64 = 0.5; // contraction
    const SIGMA: f64 = 0.5; // shrink

    let eval = |p: &[f64; 3]| f(p).unwrap_or(f64::INFINITY);

    // Initial simplex: start plus a perturbation along each axis.
    let mut simplex: Vec<([f64; 3], f64)> = Vec::with_capacity(4);
    simplex.push((start, eval(&start)));
    for i in 0..3 {
        let mut p = start;
        let step = if p[i].abs() > 1e-8 { 0.10 * p[i] } else { 0.0025 };
        p[i] += step;
        simplex.push((p, eval(&p)));
    }
    if simplex.iter().all(|(_, v)| !v.is_finite()) {
        return None;
    }

    for _ in 0..max_iter {
        simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let best = simplex[0].1;
        let worst = simplex[3].1;
        if worst.is_finite() && (worst - best).abs() < tol {
            break;
        }

        // Centroid of all but the worst vertex.
        let mut centroid = [0.0f64; 3];
        for (p, _) in simplex.iter().take(3) {
            for i in 0..3 {
                centroid[i] += p[i] / 3.0;
            }
        }

        let worst_point = simplex[3].0;
        let reflect = |scale: f64| {
            let mut p = [0.0f64; 3];
            for i in 0..3 {
                p[i] = centroid[i] + scale * (centroid[i] - worst_point[i]);
            }
            p
        };

        let reflected = reflect(ALPHA);
        let fr = eval(&reflected);

        if fr < simplex[0].1 {
            let expanded = reflect(GAMMA);
            let fe = eval(&expanded);
            simplex[3] = if fe < fr { (expanded, fe) } else { (reflected, fr) };
        } else if fr < simplex[2].1 {
            simplex[3] = (reflected, fr);
        } else {
            let contracted = reflect(-RHO);
            let fc = eval(&contracted);
            if fc < simplex[3].1 {
                simplex[3] = (contracted, fc);
            } else {
                // Shrink toward the best vertex.
                let best_point = simplex[0].0;
                for vertex in simplex.iter_mut().skip(1) {
                    for i in 0..3 {
                        vertex.0[i] = best_point[i] + SIGMA * (vertex.0[i] - best_point[i]);
                    }
                    vertex.1 = eval(&vertex.0);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    simplex[0].1.is_finite().then_some(simplex[0].0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    /// Synthetic GARCH-like path with volatility clustering.
    fn clustered_returns(seed: u64, n: usize, base_vol: f64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sigma = base_vol;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let normal = Normal::new(0.0003, sigma).unwrap();
            let r: f64 = normal.sample(&mut rng);
            out.push(r);
            sigma = (1e-5 + 0.1 * r * r + 0.85 * sigma * sigma).sqrt();
        }
        out
    }

    #[test]
    fn test_short_series_falls_back_to_ewma() {
        let returns = vec![0.01, -0.02, 0.005, 0.015];
        let fc = fit_garch(&returns, "SUI");
        assert_eq!(fc.model, VolatilityModel::EwmaFallback);
        assert!(fc.forecast_vol > 0.0);
    }

    #[test]
    fn test_garch_fit_on_clustered_series() {
        let returns = clustered_returns(42, 120, 0.02);
        let fc = fit_garch(&returns, "BTC");
        // Either a stationary GARCH fit or a clean fallback; never a
        // non-stationary GARCH result.
        if fc.model == VolatilityModel::Garch {
            assert!(fc.persistence < 1.0);
            assert!(fc.omega > 0.0);
            assert!(fc.alpha >= 0.0);
            assert!(fc.beta >= 0.0);
            assert!(fc.log_likelihood.is_finite());
        }
        assert!(fc.forecast_vol > 0.0);
        assert!(fc.forecast_vol.is_finite());
    }

    #[test]
    fn test_forecast_vol_annualized_scale() {
        // Constant 2% daily vol should annualize near 0.02 * sqrt(365) ~ 0.38.
        let returns = clustered_returns(7, 200, 0.02);
        let fc = fit_garch(&returns, "ETH");
        assert!(fc.forecast_vol > 0.05, "vol {} too small", fc.forecast_vol);
        assert!(fc.forecast_vol < 2.0, "vol {} too large", fc.forecast_vol);
    }

    #[test]
    fn test_ewma_weights_recent_more() {
        // A recent shock should push EWMA vol above the same shock long ago.
        let mut quiet_then_shock = vec![0.001; 30];
        quiet_then_shock.push(0.10);
        let mut shock_then_quiet = vec![0.001; 30];
        shock_then_quiet.insert(0, 0.10);
        let recent = ewma_volatility(&quiet_then_shock);
        let old = ewma_volatility(&shock_then_quiet);
        assert!(recent > old);
    }

    #[test]
    fn test_degenerate_series() {
        assert_eq!(ewma_volatility(&[]), 0.0);
        assert_eq!(ewma_volatility(&[0.01]), 0.0);
        let fc = fit_garch(&[0.01], "AVAX");
        assert_eq!(fc.model, VolatilityModel::EwmaFallback);
    }
}
