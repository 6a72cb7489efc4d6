//! quantvault relayer - headless event watcher.
//!
//! Polls the chain for vault events, dispatches handlers, persists cursors,
//! and logs health snapshots. Runs in demo mode (synthetic ticks, no RPC)
//! until PACKAGE_ID and PORTFOLIO_OBJECT_ID are configured.
//!
//! # Usage
//! ```sh
//! POLL_INTERVAL_S=3 cargo run --bin relayer
//! ```

use anyhow::Result;
use quantvault::config::Config;
use quantvault::domain::ports::EntropySource;
use quantvault::infrastructure::chain_rpc::JsonRpcEventClient;
use quantvault::infrastructure::entropy::{LocalEntropy, ProcessEntropy};
use quantvault::infrastructure::relayer::cursor::CursorStore;
use quantvault::infrastructure::relayer::engine::{Relayer, RelayerConfig};
use quantvault::infrastructure::relayer::handlers::{
    EventHandler, RebalanceExecutedHandler, RebalanceRequestedHandler,
};
use quantvault::infrastructure::relayer::metrics::RelayerMetrics;
use quantvault::infrastructure::submitter::{CliSubmitter, CliSubmitterConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let config = Config::from_env()?;
    info!("quantvault relayer {} starting", env!("CARGO_PKG_VERSION"));
    info!("  RPC:       {}", config.rpc_url);
    info!(
        "  Package:   {}",
        if config.package_id.is_empty() { "(not set)" } else { &config.package_id }
    );
    info!("  Cursors:   {}", config.cursor_file.display());

    let entropy: Arc<dyn EntropySource> = match &config.entropy_command {
        Some(command) => Arc::new(ProcessEntropy::new(command)),
        None => Arc::new(LocalEntropy),
    };
    let metrics = RelayerMetrics::new(config.initial_backoff_s, config.max_backoff_s)?;

    let submitter = Arc::new(CliSubmitter::new(CliSubmitterConfig {
        bin: config.chain_cli_bin.clone(),
        package_id: config.package_id.clone(),
        portfolio_id: config.portfolio_object_id.clone(),
        agent_cap_id: config.agent_cap_id.clone(),
        gas_budget: config.gas_budget,
    }));

    let handlers: Vec<(String, Arc<dyn EventHandler>)> = if config.demo_mode() {
        Vec::new()
    } else {
        vec![
            (
                format!("{}::portfolio::RebalanceRequested", config.package_id),
                Arc::new(RebalanceRequestedHandler::new(
                    entropy.clone(),
                    submitter,
                    config.qrng_shots,
                    metrics.clone(),
                )) as Arc<dyn EventHandler>,
            ),
            (
                format!("{}::portfolio::RebalanceExecuted", config.package_id),
                Arc::new(RebalanceExecutedHandler) as Arc<dyn EventHandler>,
            ),
        ]
    };

    let rpc = Arc::new(JsonRpcEventClient::new(&config.rpc_url)?);
    let cursors = CursorStore::load(&config.cursor_file);

    let (shutdown_tx, shutdown_rx) = watch::channel(true);
    spawn_signal_listener(shutdown_tx);

    let relayer = Relayer::new(
        rpc,
        handlers,
        cursors,
        metrics,
        entropy,
        RelayerConfig {
            poll_interval_s: config.poll_interval_s,
            health_log_interval_s: config.health_log_interval_s,
            qrng_shots: config.qrng_shots,
            demo_mode: config.demo_mode(),
        },
        shutdown_rx,
    );

    relayer.run().await;
    Ok(())
}

/// Flip the running flag on SIGINT or SIGTERM; in-flight awaits complete.
fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("SIGINT received - shutting down"),
                _ = sigterm.recv() => info!("SIGTERM received - shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("Ctrl-C received - shutting down");
        }
        let _ = shutdown_tx.send(false);
    });
}
