//! Pipeline orchestrator: Market, then Execution, then Risk, composed as
//! three plain calls over one owned state. Each agent runs exactly once per
//! request; an agent error short-circuits to `status = error` and never
//! propagates past this boundary.

use crate::application::agents::PipelineState;
use crate::application::agents::execution::ExecutionAgent;
use crate::application::agents::market::MarketAgent;
use crate::application::agents::risk::RiskAgent;
use crate::domain::types::PipelineStatus;
use std::time::Instant;
use tracing::error;

pub struct Pipeline {
    market: MarketAgent,
    execution: ExecutionAgent,
    risk: RiskAgent,
}

impl Pipeline {
    pub fn new(market: MarketAgent, execution: ExecutionAgent, risk: RiskAgent) -> Self {
        Self {
            market,
            execution,
            risk,
        }
    }

    /// Run the full pipeline for one request and return the final state.
    pub async fn run(&self, user_id: &str, risk_tolerance: f64, use_mock: bool) -> PipelineState {
        let mut state = PipelineState::new(user_id, risk_tolerance, use_mock);
        let t0 = Instant::now();

        if let Err(e) = self.market.run(&mut state).await {
            error!("Market stage failed: {}", e);
            state.log("Pipeline", &format!("Market stage failed: {e}"));
            state.status = PipelineStatus::Error;
            return state;
        }
        if state.assets.is_empty() || state.cov.is_none() {
            state.log("Pipeline", "Market stage produced no usable universe");
            state.status = PipelineStatus::Error;
            return state;
        }

        if let Err(e) = self.execution.run(&mut state).await {
            error!("Execution stage failed: {}", e);
            state.log("Pipeline", &format!("Execution stage failed: {e}"));
            state.status = PipelineStatus::Error;
            return state;
        }

        if let Err(e) = self.risk.run(&mut state).await {
            error!("Risk stage failed: {}", e);
            state.log("Pipeline", &format!("Risk stage failed: {e}"));
            state.status = PipelineStatus::Error;
            return state;
        }

        state.log(
            "Pipeline",
            &format!("Total pipeline time: {:.3}s", t0.elapsed().as_secs_f64()),
        );
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::market_data::mock::MockMarketData;
    use crate::application::optimization::solver::AnnealParams;
    use crate::domain::ports::{BitCounts, EntropySource, MarketDataProvider, MarketSnapshot};
    use crate::domain::risk::RiskLimits;
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct ZeroEntropy;

    #[async_trait]
    impl EntropySource for ZeroEntropy {
        async fn draw(&self, shots: u32) -> Result<BitCounts> {
            Ok(BitCounts {
                zeros: shots as u64,
                ones: 0,
            })
        }
        fn name(&self) -> &str {
            "zero"
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl MarketDataProvider for FailingProvider {
        async fn fetch(&self, _days: usize) -> Result<MarketSnapshot> {
            bail!("upstream unavailable")
        }
        async fn current_prices(&self) -> Result<HashMap<String, f64>> {
            bail!("upstream unavailable")
        }
    }

    fn pipeline(provider: Arc<dyn MarketDataProvider>) -> Pipeline {
        Pipeline::new(
            MarketAgent::new(provider, 0.35),
            ExecutionAgent::new(Arc::new(ZeroEntropy), AnnealParams::default(), 0.05, 50_000.0)
                .with_seed(7),
            RiskAgent::new(RiskLimits::default()),
        )
    }

    #[tokio::test]
    async fn test_pipeline_terminal_status() {
        let p = pipeline(Arc::new(MockMarketData::new()));
        let state = p.run("demo", 0.5, true).await;
        assert!(matches!(
            state.status,
            PipelineStatus::Approved | PipelineStatus::PendingApproval | PipelineStatus::Rejected
        ));
        assert!(state.optimization_result.is_some());
        assert!(state.risk_checks.is_some());
    }

    #[tokio::test]
    async fn test_market_failure_short_circuits() {
        let p = pipeline(Arc::new(FailingProvider));
        let state = p.run("demo", 0.5, false).await;
        assert_eq!(state.status, PipelineStatus::Error);
        assert!(state.optimization_result.is_none());
        assert!(state.risk_checks.is_none());
    }

    #[tokio::test]
    async fn test_pipeline_within_wall_time_budget() {
        let t0 = std::time::Instant::now();
        let p = pipeline(Arc::new(MockMarketData::new()));
        let _ = p.run("demo", 0.5, true).await;
        assert!(t0.elapsed().as_secs_f64() < 15.0);
    }
}
