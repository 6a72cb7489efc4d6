use thiserror::Error;

/// Errors raised inside the decision pipeline.
///
/// Agents return these; the orchestrator short-circuits to `status = error`
/// without letting anything propagate past the pipeline boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Market data unavailable: {0}")]
    MarketData(String),

    #[error("Numerical failure in {stage}: {reason}")]
    Numerical { stage: &'static str, reason: String },

    #[error("Entropy source failed: {0}")]
    Entropy(String),
}

/// Errors from the plan submitter.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Submitter timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Chain CLI not found: {0}")]
    CliMissing(String),

    #[error("Transaction rejected: {raw}")]
    Rejected { raw: String },

    #[error("Malformed submitter output: {0}")]
    BadOutput(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the relayer's poll loop.
///
/// All of these feed the exponential backoff path; none terminates the
/// process.
#[derive(Debug, Error)]
pub enum RelayerError {
    #[error("RPC failure: {0}")]
    Rpc(String),

    #[error("Handler {handler} failed for {event_type}: {reason}")]
    Handler {
        handler: String,
        event_type: String,
        reason: String,
    },

    #[error("Cursor store failure: {0}")]
    CursorStore(#[from] std::io::Error),
}
