//! Event handlers dispatched by the relayer engine. The engine treats
//! payloads opaquely; each handler documents the fields it reads.

use crate::domain::ports::{ChainEvent, EntropySource, PlanSubmitter};
use crate::infrastructure::relayer::metrics::RelayerMetrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &ChainEvent) -> Result<()>;
}

/// RebalanceRequested -> entropy draw -> on-chain acknowledgement.
///
/// Reads `requester` from the payload (informational only).
pub struct RebalanceRequestedHandler {
    entropy: Arc<dyn EntropySource>,
    submitter: Arc<dyn PlanSubmitter>,
    shots: u32,
    metrics: RelayerMetrics,
}

impl RebalanceRequestedHandler {
    pub fn new(
        entropy: Arc<dyn EntropySource>,
        submitter: Arc<dyn PlanSubmitter>,
        shots: u32,
        metrics: RelayerMetrics,
    ) -> Self {
        Self {
            entropy,
            submitter,
            shots,
            metrics,
        }
    }
}

#[async_trait]
impl EventHandler for RebalanceRequestedHandler {
    fn name(&self) -> &str {
        "rebalance_requested"
    }

    async fn handle(&self, event: &ChainEvent) -> Result<()> {
        let requester = event
            .parsed_json
            .get("requester")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        info!(
            "RebalanceRequested: requester={}, tx={}",
            requester, event.id.tx_digest
        );

        let counts = match self.entropy.draw(self.shots).await {
            Ok(counts) => {
                self.metrics.rng_triggered.inc();
                counts
            }
            Err(e) => {
                self.metrics.rng_failures.inc();
                return Err(e).context("entropy draw failed");
            }
        };
        info!(
            "Entropy draw: {} ones / {} shots",
            counts.ones,
            counts.total()
        );

        self.submitter
            .acknowledge_draw(counts.ones)
            .await
            .context("acknowledge_draw failed")?;
        Ok(())
    }
}

/// RebalanceExecuted: informational log of the completed plan.
///
/// Reads `quantum_score` and `total_value` from the payload when present.
pub struct RebalanceExecutedHandler;

#[async_trait]
impl EventHandler for RebalanceExecutedHandler {
    fn name(&self) -> &str {
        "rebalance_executed"
    }

    async fn handle(&self, event: &ChainEvent) -> Result<()> {
        let score = event
            .parsed_json
            .get("quantum_score")
            .and_then(|v| v.as_u64());
        let total_value = event
            .parsed_json
            .get("total_value")
            .and_then(|v| v.as_u64());
        info!(
            "RebalanceExecuted: tx={}, score={:?}, total_value={:?}",
            event.id.tx_digest, score, total_value
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::EventId;
    use crate::infrastructure::entropy::LocalEntropy;
    use crate::infrastructure::submitter::MockSubmitter;

    fn event(payload: serde_json::Value) -> ChainEvent {
        ChainEvent {
            id: EventId {
                tx_digest: "0xabc".to_string(),
                event_seq: "0".to_string(),
            },
            event_type: "0xpkg::portfolio::RebalanceRequested".to_string(),
            timestamp_ms: 1_700_000_000_000,
            parsed_json: payload,
        }
    }

    #[tokio::test]
    async fn test_requested_handler_draws_and_acks() {
        let submitter = Arc::new(MockSubmitter::new());
        let metrics = RelayerMetrics::new(1, 60).unwrap();
        let handler = RebalanceRequestedHandler::new(
            Arc::new(LocalEntropy),
            submitter.clone(),
            32,
            metrics.clone(),
        );

        handler
            .handle(&event(serde_json::json!({"requester": "0xme"})))
            .await
            .unwrap();

        assert_eq!(submitter.acknowledged().len(), 1);
        assert!(submitter.acknowledged()[0] <= 32);
        assert_eq!(metrics.rng_triggered.get(), 1);
        assert_eq!(metrics.rng_failures.get(), 0);
    }

    #[tokio::test]
    async fn test_executed_handler_tolerates_missing_fields() {
        let handler = RebalanceExecutedHandler;
        handler.handle(&event(serde_json::json!({}))).await.unwrap();
    }
}
