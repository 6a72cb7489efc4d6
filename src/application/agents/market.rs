//! Market intelligence stage: fetch the universe, produce forward-looking
//! (mu, Sigma), apply the sentiment tilt, and summarize for the logs.

use crate::application::agents::PipelineState;
use crate::application::market_data::covariance;
use crate::domain::errors::PipelineError;
use crate::domain::ports::MarketDataProvider;
use std::sync::Arc;

/// Sentiment tilt per unit of risk tolerance away from neutral.
const SENTIMENT_SLOPE: f64 = 0.05;

/// Days of history requested from the provider.
const HISTORY_DAYS: usize = 30;

pub struct MarketAgent {
    provider: Arc<dyn MarketDataProvider>,
    /// Average-diagonal-vol target applied after assembly.
    target_avg_vol: f64,
}

impl MarketAgent {
    pub fn new(provider: Arc<dyn MarketDataProvider>, target_avg_vol: f64) -> Self {
        Self {
            provider,
            target_avg_vol,
        }
    }

    pub async fn run(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        state.log("MarketAgent", "Collecting market intelligence ...");

        let snapshot = self
            .provider
            .fetch(HISTORY_DAYS)
            .await
            .map_err(|e| PipelineError::MarketData(e.to_string()))?;

        let mut assets = snapshot.assets;
        if assets.is_empty() {
            return Err(PipelineError::MarketData("provider returned an empty universe".into()));
        }

        let cov = match (snapshot.cov, snapshot.returns) {
            // Pre-assembled covariance (mock/demo): take it as-is together
            // with the universe's stated expected returns.
            (Some(cov), _) => {
                state.log(
                    "MarketAgent",
                    &format!("Using provided universe ({} assets)", assets.len()),
                );
                cov
            }
            // Raw history: run the full estimator stack.
            (None, Some(returns)) => {
                let symbols: Vec<String> = assets.iter().map(|a| a.symbol.clone()).collect();
                let (mut cov, forecasts) = covariance::forecast_covariance(&returns, &symbols)?;
                covariance::shrink_to_target_vol(&mut cov, self.target_avg_vol);

                let raw_mu = covariance::estimate_annualized_returns(&returns);
                let calibrated = covariance::calibrate_returns(&raw_mu);
                for (asset, mu) in assets.iter_mut().zip(&calibrated) {
                    asset.expected_return = *mu;
                }

                let garch_count = forecasts
                    .iter()
                    .filter(|f| f.model == crate::domain::types::VolatilityModel::Garch)
                    .count();
                state.log(
                    "MarketAgent",
                    &format!(
                        "Estimated (mu, Sigma) from {} days of history ({}/{} GARCH fits)",
                        returns[0].len(),
                        garch_count,
                        forecasts.len()
                    ),
                );
                state.vol_forecasts = forecasts;
                cov
            }
            (None, None) => {
                return Err(PipelineError::MarketData(
                    "provider returned neither covariance nor returns".into(),
                ));
            }
        };

        // Sentiment tilt: aggressive users see slightly rosier returns.
        let sentiment = (state.risk_tolerance - 0.5) * SENTIMENT_SLOPE;
        for asset in &mut assets {
            asset.expected_return += sentiment;
        }

        let top_return = assets
            .iter()
            .map(|a| a.expected_return)
            .fold(f64::NEG_INFINITY, f64::max);
        state.market_summary = format!(
            "Fetched {} assets. Top expected return: {:.2}% (sentiment adj: {:+.2}%)",
            assets.len(),
            top_return * 100.0,
            sentiment * 100.0
        );
        let summary = state.market_summary.clone();
        state.log("MarketAgent", &summary);
        let symbols: Vec<&str> = assets.iter().map(|a| a.symbol.as_str()).collect();
        state.log("MarketAgent", &format!("Assets: {:?}", symbols));

        let mut detail_lines = vec!["Market intelligence report:".to_string()];
        for (i, asset) in assets.iter().enumerate() {
            let vol = cov[(i, i)].max(0.0).sqrt();
            detail_lines.push(format!(
                "  {} (ret={:.2}%, vol={:.2}%)",
                asset.symbol,
                asset.expected_return * 100.0,
                vol * 100.0
            ));
        }
        detail_lines.push(format!(
            "  Sentiment adjustment {:+.2}% from risk tolerance {:.0}%",
            sentiment * 100.0,
            state.risk_tolerance * 100.0
        ));
        state
            .reasoning
            .insert("MarketAgent".to_string(), detail_lines.join("\n"));

        state.assets = assets;
        state.cov = Some(cov);
        state.market_timestamp = Some(chrono::Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::market_data::mock::MockMarketData;
    use crate::domain::ports::MarketSnapshot;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct EmptyProvider;

    #[async_trait]
    impl MarketDataProvider for EmptyProvider {
        async fn fetch(&self, _days: usize) -> Result<MarketSnapshot> {
            Ok(MarketSnapshot {
                assets: Vec::new(),
                cov: None,
                returns: None,
            })
        }
        async fn current_prices(&self) -> Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn test_market_agent_populates_state() {
        let agent = MarketAgent::new(Arc::new(MockMarketData::new()), 0.35);
        let mut state = PipelineState::new("u", 0.5, true);
        agent.run(&mut state).await.unwrap();
        assert_eq!(state.assets.len(), 5);
        assert!(state.cov.is_some());
        assert!(state.market_timestamp.is_some());
        assert!(state.market_summary.contains("5 assets"));
    }

    #[tokio::test]
    async fn test_sentiment_adjustment_neutral_at_half() {
        let agent = MarketAgent::new(Arc::new(MockMarketData::new()), 0.35);
        let mut state = PipelineState::new("u", 0.5, true);
        agent.run(&mut state).await.unwrap();
        // risk_tolerance = 0.5 leaves the mock returns untouched.
        assert!((state.assets[0].expected_return - 0.35).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_sentiment_adjustment_aggressive() {
        let agent = MarketAgent::new(Arc::new(MockMarketData::new()), 0.35);
        let mut state = PipelineState::new("u", 1.0, true);
        agent.run(&mut state).await.unwrap();
        // Delta = (1.0 - 0.5) * 0.05 = +2.5%.
        assert!((state.assets[0].expected_return - 0.375).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_empty_universe_is_an_error() {
        let agent = MarketAgent::new(Arc::new(EmptyProvider), 0.35);
        let mut state = PipelineState::new("u", 0.5, true);
        assert!(agent.run(&mut state).await.is_err());
    }

    #[tokio::test]
    async fn test_synthetic_history_runs_estimator() {
        let agent = MarketAgent::new(Arc::new(MockMarketData::with_synthetic_history(11)), 0.35);
        let mut state = PipelineState::new("u", 0.5, true);
        agent.run(&mut state).await.unwrap();
        assert_eq!(state.vol_forecasts.len(), 5);
        let cov = state.cov.as_ref().unwrap();
        // Shrinkage targets 35% average diagonal vol.
        let avg_vol: f64 = (0..5).map(|i| cov[(i, i)].sqrt()).sum::<f64>() / 5.0;
        assert!((avg_vol - 0.35).abs() < 1e-6);
        // Calibrated returns (plus neutral sentiment) stay inside the band.
        for asset in &state.assets {
            assert!(asset.expected_return >= 0.025 - 1e-9);
            assert!(asset.expected_return <= 0.275 + 1e-9);
        }
    }
}
