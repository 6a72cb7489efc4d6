//! The rebalance plan: the immutable bundle of swap intents emitted once the
//! risk stage approves a run, plus the pending-approval wrapper for plans
//! awaiting human sign-off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single swap leg. On the receiving side the whole plan aborts if any
/// leg's executed output is below `min_out_base_units`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapIntent {
    pub symbol: String,
    pub amount_base_units: u64,
    pub min_out_base_units: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_hint: Option<String>,
}

/// Immutable once built from an approved pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancePlan {
    /// Opaque on-chain object identifier.
    pub portfolio_id: String,
    /// Ordered by descending weight, ties broken lexicographically.
    pub intents: Vec<SwapIntent>,
    pub is_quantum_optimized: bool,
    /// 0..=100.
    pub quantum_score: u8,
    /// SHA-256 over the canonical optimization outcome.
    pub audit_proof_hash: [u8; 32],
    /// Short UTF-8 summary, at most 256 bytes.
    pub reason: String,
}

impl RebalancePlan {
    pub fn swap_amounts(&self) -> Vec<u64> {
        self.intents.iter().map(|i| i.amount_base_units).collect()
    }

    pub fn swap_min_outs(&self) -> Vec<u64> {
        self.intents.iter().map(|i| i.min_out_base_units).collect()
    }

    pub fn proof_hash_hex(&self) -> String {
        hex::encode(self.audit_proof_hash)
    }
}

/// Receipt from the downstream submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    pub digest: String,
    pub gas_used: u64,
    /// True when the submitter simulated instead of reaching a chain.
    pub dry_run: bool,
}

/// A plan parked in the approval store until an operator resolves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Short opaque id (8 hex chars).
    pub id: String,
    pub plan: RebalancePlan,
    pub created_at: DateTime<Utc>,
    pub reasons: Vec<String>,
    /// Snapshot of the pipeline state at the time the plan was parked.
    pub state_snapshot: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> RebalancePlan {
        RebalancePlan {
            portfolio_id: "0xportfolio".to_string(),
            intents: vec![
                SwapIntent {
                    symbol: "SUI".to_string(),
                    amount_base_units: 20_000_000_000,
                    min_out_base_units: 19_800_000_000,
                    venue_hint: None,
                },
                SwapIntent {
                    symbol: "BTC".to_string(),
                    amount_base_units: 15_000_000_000,
                    min_out_base_units: 14_900_000_000,
                    venue_hint: None,
                },
            ],
            is_quantum_optimized: true,
            quantum_score: 42,
            audit_proof_hash: [7u8; 32],
            reason: "test".to_string(),
        }
    }

    #[test]
    fn test_swap_vectors_align() {
        let plan = sample_plan();
        assert_eq!(plan.swap_amounts(), vec![20_000_000_000, 15_000_000_000]);
        assert_eq!(plan.swap_min_outs(), vec![19_800_000_000, 14_900_000_000]);
        assert_eq!(plan.swap_amounts().len(), plan.swap_min_outs().len());
    }

    #[test]
    fn test_proof_hash_hex_length() {
        assert_eq!(sample_plan().proof_hash_hex().len(), 64);
    }
}
