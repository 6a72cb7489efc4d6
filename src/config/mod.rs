//! Configuration loading from environment variables.
//!
//! A `Config` is built once at startup and passed by reference; there are no
//! process-wide mutable singletons. Every guardrail constant lives here so
//! the pipeline, the plan builder and the relayer all read one source of
//! truth.

use crate::domain::risk::RiskLimits;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Placeholder value deployments leave in .env before the contract exists.
const UNSET_OBJECT_ID: &str = "0x...";

#[derive(Debug, Clone)]
pub struct Config {
    // Guardrails
    pub max_position_weight: f64,
    pub max_portfolio_risk: f64,
    pub min_expected_return: f64,
    pub max_solver_time_s: f64,
    pub max_daily_volume_usd: f64,

    // Approval policy
    pub approval_threshold_usd: f64,
    pub approval_risk_threshold: f64,

    // Solver
    pub num_reads: usize,
    pub num_sweeps: usize,

    // Estimator
    pub target_avg_vol: f64,
    pub min_weight: f64,

    // Slippage / plan sizing
    pub portfolio_value_usd: f64,

    // Entropy
    pub qrng_shots: u32,
    /// External entropy command; unset means the local source.
    pub entropy_command: Option<String>,

    // Relayer
    pub rpc_url: String,
    pub package_id: String,
    pub portfolio_object_id: String,
    pub agent_cap_id: String,
    pub poll_interval_s: u64,
    pub initial_backoff_s: u64,
    pub max_backoff_s: u64,
    pub health_log_interval_s: u64,
    pub cursor_file: PathBuf,

    // Submitter
    pub chain_cli_bin: String,
    pub gas_budget: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_position_weight: parse_f64("MAX_POSITION_WEIGHT", 0.40)?,
            max_portfolio_risk: parse_f64("MAX_PORTFOLIO_RISK", 0.45)?,
            min_expected_return: parse_f64("MIN_EXPECTED_RETURN", 0.01)?,
            max_solver_time_s: parse_f64("MAX_SOLVER_TIME_S", 5.0)?,
            max_daily_volume_usd: parse_f64("MAX_DAILY_VOLUME_USD", 1_000_000.0)?,
            approval_threshold_usd: parse_f64("APPROVAL_THRESHOLD_USD", 50_000.0)?,
            approval_risk_threshold: parse_f64("APPROVAL_RISK_THRESHOLD", 0.30)?,
            num_reads: parse_usize("NUM_READS", 200)?,
            num_sweeps: parse_usize("NUM_SWEEPS", 1000)?,
            target_avg_vol: parse_f64("TARGET_AVG_VOL", 0.35)?,
            min_weight: parse_f64("MIN_WEIGHT", 0.05)?,
            portfolio_value_usd: parse_f64("PORTFOLIO_VALUE_USD", 50_000.0)?,
            qrng_shots: parse_u32("QRNG_SHOTS", 100)?,
            entropy_command: env::var("ENTROPY_COMMAND").ok().filter(|s| !s.is_empty()),
            rpc_url: env::var("CHAIN_RPC_URL")
                .unwrap_or_else(|_| "https://fullnode.devnet.sui.io:443".to_string()),
            package_id: env::var("PACKAGE_ID").unwrap_or_default(),
            portfolio_object_id: env::var("PORTFOLIO_OBJECT_ID").unwrap_or_default(),
            agent_cap_id: env::var("AGENT_CAP_ID").unwrap_or_default(),
            poll_interval_s: parse_u64("POLL_INTERVAL_S", 3)?,
            initial_backoff_s: parse_u64("INITIAL_BACKOFF_S", 1)?,
            max_backoff_s: parse_u64("MAX_BACKOFF_S", 60)?,
            health_log_interval_s: parse_u64("HEALTH_LOG_INTERVAL_S", 60)?,
            cursor_file: env::var("CURSOR_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".relayer_cursors.json")),
            chain_cli_bin: env::var("CHAIN_CLI_BIN").unwrap_or_else(|_| "sui".to_string()),
            gas_budget: parse_u64("GAS_BUDGET", 10_000_000)?,
        })
    }

    /// Guardrail limits for the risk state machine.
    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_position_weight: self.max_position_weight,
            max_portfolio_risk: self.max_portfolio_risk,
            min_expected_return: self.min_expected_return,
            max_solver_time_s: self.max_solver_time_s,
            max_daily_volume_usd: self.max_daily_volume_usd,
            approval_threshold_usd: self.approval_threshold_usd,
            approval_risk_threshold: self.approval_risk_threshold,
        }
    }

    /// No deployed contract configured: the relayer runs synthetic ticks and
    /// the submitter dry-runs.
    pub fn demo_mode(&self) -> bool {
        self.package_id.is_empty()
            || self.package_id == UNSET_OBJECT_ID
            || self.portfolio_object_id.is_empty()
            || self.portfolio_object_id == UNSET_OBJECT_ID
    }
}

fn parse_f64(key: &str, default: f64) -> Result<f64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<f64>()
        .context(format!("Failed to parse {}", key))
}

fn parse_u32(key: &str, default: u32) -> Result<u32> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u32>()
        .context(format!("Failed to parse {}", key))
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .context(format!("Failed to parse {}", key))
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<usize>()
        .context(format!("Failed to parse {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_env().expect("defaults must parse");
        assert_eq!(config.num_reads, 200);
        assert_eq!(config.num_sweeps, 1000);
        assert_eq!(config.poll_interval_s, 3);
        assert_eq!(config.max_backoff_s, 60);
        assert!((config.max_portfolio_risk - 0.45).abs() < 1e-12);
        assert!((config.min_expected_return - 0.01).abs() < 1e-12);
        assert!((config.target_avg_vol - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_demo_mode_when_unset() {
        let config = Config::from_env().unwrap();
        assert!(config.demo_mode());
    }

    #[test]
    fn test_risk_limits_mirror_config() {
        let config = Config::from_env().unwrap();
        let limits = config.risk_limits();
        assert_eq!(limits.max_position_weight, config.max_position_weight);
        assert_eq!(limits.approval_threshold_usd, config.approval_threshold_usd);
    }
}
