//! In-memory store for plans awaiting human sign-off.
//!
//! Process-wide, mutex-guarded. Resolving is an atomic remove-and-return, so
//! two racing approvers cannot both submit the same plan; callers must
//! tolerate `None` on resolve.

use crate::domain::plan::{PendingApproval, RebalancePlan};
use chrono::{Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

#[derive(Default)]
pub struct ApprovalStore {
    inner: Mutex<HashMap<String, PendingApproval>>,
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a plan and return its short opaque id.
    pub fn create(
        &self,
        plan: RebalancePlan,
        reasons: Vec<String>,
        state_snapshot: serde_json::Value,
    ) -> String {
        let id = format!("{:08x}", rand::rng().random::<u32>());
        let pending = PendingApproval {
            id: id.clone(),
            plan,
            created_at: Utc::now(),
            reasons,
            state_snapshot,
        };
        info!("Parked plan {} pending approval ({} reasons)", id, pending.reasons.len());
        self.inner.lock().expect("approval store poisoned").insert(id.clone(), pending);
        id
    }

    /// Atomically remove and return; `None` when already resolved or expired.
    pub fn resolve(&self, id: &str) -> Option<PendingApproval> {
        self.inner.lock().expect("approval store poisoned").remove(id)
    }

    /// All pending entries, oldest first.
    pub fn list(&self) -> Vec<PendingApproval> {
        let mut entries: Vec<PendingApproval> = self
            .inner
            .lock()
            .expect("approval store poisoned")
            .values()
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("approval store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries older than the horizon; returns how many were evicted.
    pub fn evict_older_than(&self, horizon: Duration) -> usize {
        let cutoff = Utc::now() - horizon;
        let mut guard = self.inner.lock().expect("approval store poisoned");
        let before = guard.len();
        guard.retain(|_, e| e.created_at >= cutoff);
        before - guard.len()
    }
}
