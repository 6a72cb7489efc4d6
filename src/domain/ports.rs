//! Trait seams between the decision core and the outside world.
//!
//! Every external dependency (market data, entropy, the chain submitter, the
//! event RPC) is injected through one of these, so the core stays testable
//! with in-memory doubles.

use crate::domain::errors::SubmitError;
use crate::domain::plan::{RebalancePlan, TxReceipt};
use crate::domain::types::Asset;
use anyhow::Result;
use async_trait::async_trait;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Universe snapshot handed to the market stage.
///
/// Either `cov` is pre-assembled (mock/demo universes) or `returns` carries
/// the raw daily log-return rows for the estimator to work on.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub assets: Vec<Asset>,
    /// Annualized covariance, when the source already provides one.
    pub cov: Option<DMatrix<f64>>,
    /// Per-asset daily log returns, row i matching `assets[i]`. Rows are
    /// trimmed to a common length by the provider.
    pub returns: Option<Vec<Vec<f64>>>,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch the tradeable universe and its return history.
    async fn fetch(&self, days: usize) -> Result<MarketSnapshot>;

    /// Current spot prices in USD, keyed by symbol.
    async fn current_prices(&self) -> Result<std::collections::HashMap<String, f64>>;
}

/// Outcome of one entropy draw: counts of measured zeros and ones.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BitCounts {
    #[serde(rename = "0")]
    pub zeros: u64,
    #[serde(rename = "1")]
    pub ones: u64,
}

impl BitCounts {
    pub fn total(&self) -> u64 {
        self.zeros + self.ones
    }

    /// Fraction of ones in [0, 1]; 0 for an empty draw.
    pub fn fraction_ones(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.ones as f64 / self.total() as f64
        }
    }
}

/// Swappable entropy source (spec-grade local RNG by default, an external
/// hardware-anchored process where compliance demands it).
#[async_trait]
pub trait EntropySource: Send + Sync {
    async fn draw(&self, shots: u32) -> Result<BitCounts>;

    fn name(&self) -> &str;
}

/// Downstream submitter: one call per approved plan.
#[async_trait]
pub trait PlanSubmitter: Send + Sync {
    async fn submit(&self, plan: &RebalancePlan) -> Result<TxReceipt, SubmitError>;

    /// Acknowledge an entropy draw on-chain (relayer handler path).
    async fn acknowledge_draw(&self, entropy_value: u64) -> Result<(), SubmitError>;
}

/// Identifier the relayer dedups on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    pub tx_digest: String,
    pub event_seq: String,
}

impl EventId {
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.tx_digest, self.event_seq)
    }
}

/// One event record as returned by the chain RPC. The payload is opaque to
/// the engine; handlers pick out the fields they document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEvent {
    pub id: EventId,
    pub event_type: String,
    pub timestamp_ms: u64,
    pub parsed_json: serde_json::Value,
}

/// One page of events plus the resumable cursor.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub data: Vec<ChainEvent>,
    /// Opaque cursor; `None` means the RPC returned no new position.
    pub next_cursor: Option<serde_json::Value>,
}

#[async_trait]
pub trait EventRpc: Send + Sync {
    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&serde_json::Value>,
        limit: usize,
    ) -> Result<EventPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_counts_fraction() {
        let counts = BitCounts { zeros: 12, ones: 4 };
        assert!((counts.fraction_ones() - 0.25).abs() < 1e-12);
        assert_eq!(BitCounts::default().fraction_ones(), 0.0);
    }

    #[test]
    fn test_event_dedup_key() {
        let id = EventId {
            tx_digest: "0xabc".to_string(),
            event_seq: "3".to_string(),
        };
        assert_eq!(id.dedup_key(), "0xabc:3");
    }
}
