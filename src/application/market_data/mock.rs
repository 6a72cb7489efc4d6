//! Mock market data: the canonical 5-asset demo universe and a synthetic
//! return generator with volatility clustering, behind the same
//! `MarketDataProvider` port the production fetcher would implement.

use crate::domain::ports::{MarketDataProvider, MarketSnapshot};
use crate::domain::types::Asset;
use anyhow::Result;
use async_trait::async_trait;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;

pub const DEMO_SYMBOLS: [&str; 5] = ["SUI", "ETH", "BTC", "SOL", "AVAX"];

/// Five mock crypto assets with a realistic annualized covariance matrix.
pub fn demo_universe() -> (Vec<Asset>, DMatrix<f64>) {
    let assets = vec![
        Asset::new("SUI", 0.35, 0.40),
        Asset::new("ETH", 0.20, 0.40),
        Asset::new("BTC", 0.15, 0.40),
        Asset::new("SOL", 0.30, 0.40),
        Asset::new("AVAX", 0.25, 0.40),
    ];
    #[rustfmt::skip]
    let cov = DMatrix::from_row_slice(5, 5, &[
        0.160, 0.048, 0.030, 0.070, 0.055, // SUI
        0.048, 0.090, 0.045, 0.040, 0.035, // ETH
        0.030, 0.045, 0.050, 0.025, 0.020, // BTC
        0.070, 0.040, 0.025, 0.140, 0.060, // SOL
        0.055, 0.035, 0.020, 0.060, 0.110, // AVAX
    ]);
    (assets, cov)
}

/// Spot prices used by the demo conversions.
pub fn demo_prices() -> HashMap<String, f64> {
    HashMap::from([
        ("SUI".to_string(), 3.50),
        ("ETH".to_string(), 3200.0),
        ("BTC".to_string(), 97_000.0),
        ("SOL".to_string(), 210.0),
        ("AVAX".to_string(), 40.0),
    ])
}

/// Synthetic daily log returns with GARCH-like clustering, one row per demo
/// asset. Deterministic for a fixed seed.
pub fn synthetic_return_matrix(seed: u64, n_days: usize) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    DEMO_SYMBOLS
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let base_vol = 0.02 + i as f64 * 0.005;
            let mut sigma = base_vol;
            let mut row = Vec::with_capacity(n_days);
            for _ in 0..n_days {
                let normal = Normal::new(0.0003, sigma).expect("sigma is positive");
                let r: f64 = normal.sample(&mut rng);
                row.push(r);
                sigma = (1e-5 + 0.1 * r * r + 0.85 * sigma * sigma).sqrt();
            }
            row
        })
        .collect()
}

/// Mock provider. The default hands out the pre-assembled demo covariance;
/// `with_synthetic_history` instead returns raw paths so the estimator stack
/// gets exercised end-to-end.
pub struct MockMarketData {
    synthetic_seed: Option<u64>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self { synthetic_seed: None }
    }

    pub fn with_synthetic_history(seed: u64) -> Self {
        Self {
            synthetic_seed: Some(seed),
        }
    }
}

impl Default for MockMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    async fn fetch(&self, days: usize) -> Result<MarketSnapshot> {
        let (assets, cov) = demo_universe();
        match self.synthetic_seed {
            Some(seed) => Ok(MarketSnapshot {
                assets,
                cov: None,
                returns: Some(synthetic_return_matrix(seed, days.max(2))),
            }),
            None => Ok(MarketSnapshot {
                assets,
                cov: Some(cov),
                returns: None,
            }),
        }
    }

    async fn current_prices(&self) -> Result<HashMap<String, f64>> {
        Ok(demo_prices())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_universe_shape() {
        let (assets, cov) = demo_universe();
        assert_eq!(assets.len(), 5);
        assert_eq!(cov.nrows(), 5);
        assert_eq!(cov, cov.transpose());
        assert!((assets[0].expected_return - 0.35).abs() < 1e-12);
        assert!(assets.iter().all(|a| (a.max_weight - 0.40).abs() < 1e-12));
    }

    #[test]
    fn test_synthetic_matrix_deterministic() {
        let a = synthetic_return_matrix(9, 40);
        let b = synthetic_return_matrix(9, 40);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a.iter().all(|row| row.len() == 40));
    }

    #[tokio::test]
    async fn test_mock_provider_cov_path() {
        let provider = MockMarketData::new();
        let snapshot = provider.fetch(30).await.unwrap();
        assert!(snapshot.cov.is_some());
        assert!(snapshot.returns.is_none());
    }

    #[tokio::test]
    async fn test_mock_provider_synthetic_path() {
        let provider = MockMarketData::with_synthetic_history(3);
        let snapshot = provider.fetch(45).await.unwrap();
        assert!(snapshot.cov.is_none());
        assert_eq!(snapshot.returns.unwrap()[0].len(), 45);
    }
}
