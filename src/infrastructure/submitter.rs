//! Plan submitters behind the `PlanSubmitter` port.
//!
//! `CliSubmitter` shells out to the chain CLI with the atomic-rebalance call
//! surface; when the CLI is absent it degrades to a deterministic dry-run so
//! demos and tests never need a deployed contract. `MockSubmitter` records
//! submissions for assertions.

use crate::domain::abort;
use crate::domain::errors::SubmitError;
use crate::domain::plan::{RebalancePlan, TxReceipt};
use crate::domain::ports::PlanSubmitter;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

/// Wall-clock budget for one CLI invocation.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared clock object id on the reference chain.
const CLOCK_OBJECT: &str = "0x6";

#[derive(Debug, Clone)]
pub struct CliSubmitterConfig {
    pub bin: String,
    pub package_id: String,
    pub portfolio_id: String,
    pub agent_cap_id: String,
    pub gas_budget: u64,
}

pub struct CliSubmitter {
    config: CliSubmitterConfig,
}

impl CliSubmitter {
    pub fn new(config: CliSubmitterConfig) -> Self {
        Self { config }
    }

    fn base_args(&self, function: &str) -> Vec<String> {
        vec![
            "client".to_string(),
            "call".to_string(),
            "--package".to_string(),
            self.config.package_id.clone(),
            "--module".to_string(),
            "portfolio".to_string(),
            "--function".to_string(),
            function.to_string(),
            "--gas-budget".to_string(),
            self.config.gas_budget.to_string(),
            "--json".to_string(),
        ]
    }

    async fn run_cli(&self, args: Vec<String>) -> Result<serde_json::Value, SubmitError> {
        let mut cmd = Command::new(&self.config.bin);
        cmd.args(&args);
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(SUBMIT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| SubmitError::Timeout {
                seconds: SUBMIT_TIMEOUT.as_secs(),
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SubmitError::CliMissing(self.config.bin.clone())
                } else {
                    SubmitError::Io(e)
                }
            })?;

        if !output.status.success() {
            let raw = String::from_utf8_lossy(&output.stderr).trim().to_string();
            abort::log_abort("submitter", &raw);
            return Err(SubmitError::Rejected { raw });
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| SubmitError::BadOutput(format!("invalid CLI JSON: {e}")))
    }

    /// Deterministic simulated receipt keyed to the plan's audit hash.
    fn dry_run(&self, plan: &RebalancePlan) -> TxReceipt {
        let mut hasher = Sha256::new();
        hasher.update(plan.audit_proof_hash);
        for intent in &plan.intents {
            hasher.update(intent.symbol.as_bytes());
            hasher.update(intent.amount_base_units.to_be_bytes());
            hasher.update(intent.min_out_base_units.to_be_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        info!("DRY-RUN: would submit rebalance {}", &digest[..16]);
        TxReceipt {
            digest: format!("DRY_RUN_{}", &digest[..44]),
            gas_used: 0,
            dry_run: true,
        }
    }
}

#[async_trait]
impl PlanSubmitter for CliSubmitter {
    async fn submit(&self, plan: &RebalancePlan) -> Result<TxReceipt, SubmitError> {
        if self.config.package_id.is_empty() {
            return Ok(self.dry_run(plan));
        }

        let mut args = self.base_args("atomic_rebalance");
        args.push("--args".to_string());
        args.push(self.config.agent_cap_id.clone());
        args.push(self.config.portfolio_id.clone());
        args.push(format!("{:?}", plan.swap_amounts()));
        args.push(format!("{:?}", plan.swap_min_outs()));
        args.push(plan.is_quantum_optimized.to_string());
        args.push(plan.quantum_score.to_string());
        args.push(format!("0x{}", plan.proof_hash_hex()));
        args.push(plan.reason.clone());
        args.push(CLOCK_OBJECT.to_string());

        match self.run_cli(args).await {
            Ok(tx) => {
                let digest = tx
                    .get("digest")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string();
                let gas = tx
                    .pointer("/effects/gasUsed/computationCost")
                    .and_then(|g| g.as_str())
                    .and_then(|g| g.parse::<u64>().ok())
                    .unwrap_or(0);
                info!("atomic_rebalance TX: {}", digest);
                Ok(TxReceipt {
                    digest,
                    gas_used: gas,
                    dry_run: false,
                })
            }
            Err(SubmitError::CliMissing(bin)) => {
                warn!("{} CLI not found, falling back to dry-run", bin);
                Ok(self.dry_run(plan))
            }
            Err(e) => {
                error!("atomic_rebalance failed: {}", e);
                Err(e)
            }
        }
    }

    async fn acknowledge_draw(&self, entropy_value: u64) -> Result<(), SubmitError> {
        if self.config.package_id.is_empty() {
            info!("[DEMO] acknowledge_draw({})", entropy_value);
            return Ok(());
        }

        let mut args = self.base_args("record_entropy");
        args.push("--args".to_string());
        args.push(self.config.agent_cap_id.clone());
        args.push(self.config.portfolio_id.clone());
        args.push(entropy_value.to_string());
        args.push(CLOCK_OBJECT.to_string());

        match self.run_cli(args).await {
            Ok(tx) => {
                info!(
                    "record_entropy TX: {}",
                    tx.get("digest").and_then(|d| d.as_str()).unwrap_or("ok")
                );
                Ok(())
            }
            Err(SubmitError::CliMissing(bin)) => {
                warn!("{} CLI not found, treating entropy ack as a no-op", bin);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Test double recording every submitted plan.
#[derive(Default)]
pub struct MockSubmitter {
    submitted: std::sync::Mutex<Vec<RebalancePlan>>,
    acknowledged: std::sync::Mutex<Vec<u64>>,
    pub fail_submissions: bool,
}

impl MockSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_submissions: true,
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<RebalancePlan> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn acknowledged(&self) -> Vec<u64> {
        self.acknowledged.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlanSubmitter for MockSubmitter {
    async fn submit(&self, plan: &RebalancePlan) -> Result<TxReceipt, SubmitError> {
        if self.fail_submissions {
            return Err(SubmitError::Rejected {
                raw: "MoveAbort(_, 7)".to_string(),
            });
        }
        self.submitted.lock().unwrap().push(plan.clone());
        Ok(TxReceipt {
            digest: format!("MOCK_{}", plan.proof_hash_hex()),
            gas_used: 1_000,
            dry_run: false,
        })
    }

    async fn acknowledge_draw(&self, entropy_value: u64) -> Result<(), SubmitError> {
        if self.fail_submissions {
            return Err(SubmitError::Rejected {
                raw: "abort_code: 2".to_string(),
            });
        }
        self.acknowledged.lock().unwrap().push(entropy_value);
        Ok(())
    }
}
