//! On-chain abort-code taxonomy.
//!
//! Static registry of every numeric abort code the vault contract can raise,
//! plus the parser that digs a code out of an opaque RPC error string. The
//! registry is the single translation layer between on-chain failures and
//! user-facing text.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One registry entry for a numeric abort code.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AbortCode {
    pub code: u32,
    pub constant: &'static str,
    pub module: &'static str,
    pub severity: Severity,
    pub frontend_message: &'static str,
    pub dev_message: &'static str,
    pub recovery: &'static str,
}

/// Full registry: portfolio module codes 0..=11, oracle module codes 100..=103.
pub const ABORT_REGISTRY: &[AbortCode] = &[
    AbortCode {
        code: 0,
        constant: "EInvalidAgent",
        module: "portfolio",
        severity: Severity::Critical,
        frontend_message: "Security error: agent not authorized.",
        dev_message: "AgentCap.portfolio_id does not match the target Portfolio object id.",
        recovery: "Verify AGENT_CAP_ID is bound to the configured PORTFOLIO_ID; re-issue the capability if needed.",
    },
    AbortCode {
        code: 1,
        constant: "EAgentFrozen",
        module: "portfolio",
        severity: Severity::Critical,
        frontend_message: "Agent frozen: the admin has blocked this agent.",
        dev_message: "Agent address is in the frozen_agents vector; only the admin can unfreeze it.",
        recovery: "Ask the admin to call unfreeze_agent for this agent address.",
    },
    AbortCode {
        code: 2,
        constant: "ECooldownActive",
        module: "portfolio",
        severity: Severity::Warning,
        frontend_message: "Trade cooldown active: please wait 60 seconds.",
        dev_message: "Last trade was less than cooldown_ms ago (default 60s).",
        recovery: "Wait for the cooldown to expire, or ask the admin to lower it via update_limits.",
    },
    AbortCode {
        code: 3,
        constant: "EVolumeExceeded",
        module: "portfolio",
        severity: Severity::Error,
        frontend_message: "Risk limit exceeded: daily volume exhausted.",
        dev_message: "total_traded_today + amount > daily_volume_limit.",
        recovery: "Wait for the 24h rolling window to reset, or raise daily_volume_limit.",
    },
    AbortCode {
        code: 4,
        constant: "EDrawdownExceeded",
        module: "portfolio",
        severity: Severity::Error,
        frontend_message: "Drawdown protection: trade would exceed the maximum loss.",
        dev_message: "Projected balance after the trade would exceed max_drawdown_bps from peak.",
        recovery: "Reduce the trade amount, or ask the admin to raise max_drawdown_bps.",
    },
    AbortCode {
        code: 5,
        constant: "EInsufficientBalance",
        module: "portfolio",
        severity: Severity::Error,
        frontend_message: "Insufficient portfolio balance.",
        dev_message: "Portfolio balance is below the requested trade amount.",
        recovery: "Deposit funds via the admin, or reduce the trade amount.",
    },
    AbortCode {
        code: 6,
        constant: "EPaused",
        module: "portfolio",
        severity: Severity::Critical,
        frontend_message: "Portfolio paused: all trades are blocked.",
        dev_message: "Portfolio.paused == true; the admin activated the kill switch.",
        recovery: "Ask the admin to resume the portfolio before retrying.",
    },
    AbortCode {
        code: 7,
        constant: "ESlippageExceeded",
        module: "portfolio",
        severity: Severity::Warning,
        frontend_message: "Slippage too high: minimum output not reached.",
        dev_message: "output_amount < min_output; the venue returned less than the plan's floor.",
        recovery: "Increase the slippage tolerance (lower min_output) or wait for better market conditions.",
    },
    AbortCode {
        code: 8,
        constant: "EAtomicRebalanceFailed",
        module: "portfolio",
        severity: Severity::Error,
        frontend_message: "Atomic rebalance failed: total value check failed.",
        dev_message: "Post-rebalance portfolio value check failed; the combined swaps violate safety bounds.",
        recovery: "Reduce the swap amounts or split into smaller rebalances.",
    },
    AbortCode {
        code: 9,
        constant: "ESwapCountMismatch",
        module: "portfolio",
        severity: Severity::Error,
        frontend_message: "Invalid swap configuration: lengths do not match.",
        dev_message: "swap_amounts.length != swap_min_outputs.length.",
        recovery: "Ensure swap_amounts and swap_min_outputs have the same length.",
    },
    AbortCode {
        code: 10,
        constant: "EPostRebalanceDrawdown",
        module: "portfolio",
        severity: Severity::Critical,
        frontend_message: "Security limit: portfolio value after rebalance too low.",
        dev_message: "Post-rebalance drawdown exceeds max_drawdown_bps from peak; the whole transaction reverts.",
        recovery: "Reduce the total swap amounts; the combined effect exceeds the drawdown limit.",
    },
    AbortCode {
        code: 11,
        constant: "EProtocolNotWhitelisted",
        module: "portfolio",
        severity: Severity::Critical,
        frontend_message: "Protocol not whitelisted: target address not allowed.",
        dev_message: "Target protocol address is not in the portfolio's protocol_whitelist vector.",
        recovery: "Ask the admin to add the protocol via add_to_whitelist, or route through a whitelisted one.",
    },
    AbortCode {
        code: 100,
        constant: "ESlippageTooHigh",
        module: "oracle",
        severity: Severity::Error,
        frontend_message: "Oracle slippage: price deviation too high.",
        dev_message: "Oracle vs expected price deviation exceeds max_slippage_bps (default 100 bps).",
        recovery: "Wait for the price to stabilize or raise max_slippage_bps via update_oracle_config.",
    },
    AbortCode {
        code: 101,
        constant: "EPriceStale",
        module: "oracle",
        severity: Severity::Error,
        frontend_message: "Oracle price stale: the price feed is too old.",
        dev_message: "Oracle price timestamp is older than max_staleness_ms (default 30s).",
        recovery: "Refresh the price feed before calling the swap, or increase max_staleness_ms.",
    },
    AbortCode {
        code: 102,
        constant: "EPriceNegative",
        module: "oracle",
        severity: Severity::Critical,
        frontend_message: "Invalid oracle price: price is zero or negative.",
        dev_message: "oracle_price_x8 or expected_price_x8 is zero; the feed is unhealthy.",
        recovery: "Verify the price feed is returning valid data before retrying.",
    },
    AbortCode {
        code: 103,
        constant: "EInvalidOracleConfig",
        module: "oracle",
        severity: Severity::Error,
        frontend_message: "Invalid oracle configuration.",
        dev_message: "OracleConfig parameter out of range (max_slippage_bps > 1000 or max_staleness_ms < 1000).",
        recovery: "Use a valid config: slippage <= 1000 bps, staleness >= 1000 ms.",
    },
];

pub fn lookup(code: u32) -> Option<&'static AbortCode> {
    ABORT_REGISTRY.iter().find(|e| e.code == code)
}

/// Structured result of parsing an opaque chain error string.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedAbort {
    pub is_move_abort: bool,
    pub code: Option<u32>,
    #[serde(skip)]
    pub mapped: Option<&'static AbortCode>,
    pub frontend_message: String,
    pub raw: String,
}

fn abort_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)MoveAbort\([^)]*,\s*(\d+)\)",
            r"(?i)abort[_ ]code[:\s]+(\d+)",
            r"(?i)Move abort (\d+)",
            r"(?i)status_code.*?(\d+)",
            r"(?i)VMError.*?(\d+)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("abort pattern must compile"))
        .collect()
    })
}

/// Extract the first recognizable abort code from a raw error string.
///
/// Patterns are tried in order; the first match wins. Unmatched input is
/// returned as a non-abort with the raw text truncated to 200 characters.
pub fn parse_abort_error(raw: &str) -> ParsedAbort {
    for pattern in abort_patterns() {
        if let Some(caps) = pattern.captures(raw)
            && let Ok(code) = caps[1].parse::<u32>()
        {
            let mapped = lookup(code);
            let frontend_message = mapped
                .map(|m| m.frontend_message.to_string())
                .unwrap_or_else(|| format!("Unknown error (code {code})"));
            return ParsedAbort {
                is_move_abort: true,
                code: Some(code),
                mapped,
                frontend_message,
                raw: raw.to_string(),
            };
        }
    }

    let truncated: String = raw.chars().take(200).collect();
    ParsedAbort {
        is_move_abort: false,
        code: None,
        mapped: None,
        frontend_message: format!("Unexpected error: {truncated}"),
        raw: raw.to_string(),
    }
}

/// Full structured error record for relayer/submitter consumers.
pub fn error_body(raw: &str) -> serde_json::Value {
    let parsed = parse_abort_error(raw);
    serde_json::json!({
        "success": false,
        "error": {
            "is_move_abort": parsed.is_move_abort,
            "code": parsed.code,
            "constant": parsed.mapped.map(|m| m.constant),
            "severity": parsed.mapped.map(|m| m.severity.to_string()).unwrap_or_else(|| "error".to_string()),
            "message": parsed.frontend_message,
            "recovery": parsed.mapped.map(|m| m.recovery),
            "raw": parsed.raw,
        },
    })
}

/// Console-friendly log line for a chain error.
pub fn log_abort(context: &str, raw: &str) {
    let parsed = parse_abort_error(raw);
    match parsed.mapped {
        Some(mapped) => tracing::error!(
            "[{}] {} (code {}): {}",
            context,
            mapped.constant,
            mapped.code,
            mapped.dev_message
        ),
        None => tracing::error!("[{}] {}", context, parsed.raw),
    }
}
