//! The relayer engine: a single cooperative task tree polling the chain for
//! events, dispatching handlers, and keeping durable cursors.
//!
//! One cycle polls every configured event type sequentially, so cursors
//! advance deterministically. Any cycle error feeds the exponential backoff;
//! a clean cycle resets it. SIGINT/SIGTERM flip a watch flag polled between
//! awaits; in-flight awaits complete before shutdown.

use crate::domain::ports::{EntropySource, EventRpc};
use crate::infrastructure::relayer::cursor::CursorStore;
use crate::infrastructure::relayer::dedup::DedupCache;
use crate::infrastructure::relayer::handlers::EventHandler;
use crate::infrastructure::relayer::metrics::RelayerMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Events requested per poll.
const PAGE_LIMIT: usize = 25;

#[derive(Debug, Clone)]
pub struct RelayerConfig {
    pub poll_interval_s: u64,
    pub health_log_interval_s: u64,
    pub qrng_shots: u32,
    /// No contract configured: run synthetic ticks instead of polling.
    pub demo_mode: bool,
}

pub struct Relayer {
    rpc: Arc<dyn EventRpc>,
    handlers: Vec<(String, Arc<dyn EventHandler>)>,
    cursors: CursorStore,
    dedup: DedupCache,
    metrics: RelayerMetrics,
    entropy: Arc<dyn EntropySource>,
    config: RelayerConfig,
    running: watch::Receiver<bool>,
}

impl Relayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: Arc<dyn EventRpc>,
        handlers: Vec<(String, Arc<dyn EventHandler>)>,
        cursors: CursorStore,
        metrics: RelayerMetrics,
        entropy: Arc<dyn EntropySource>,
        config: RelayerConfig,
        running: watch::Receiver<bool>,
    ) -> Self {
        Self {
            rpc,
            handlers,
            cursors,
            dedup: DedupCache::new(),
            metrics,
            entropy,
            config,
            running,
        }
    }

    fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Sleep that wakes early when the shutdown flag flips.
    async fn interruptible_sleep(&mut self, duration: Duration) {
        let changed = self.running.changed();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = changed => {}
        }
    }

    pub async fn run(mut self) {
        info!("Relayer starting");
        info!("  poll interval: {}s", self.config.poll_interval_s);
        info!("  event types:   {}", self.handlers.len());
        info!("  cursors:       {} loaded", self.cursors.len());
        info!("  demo mode:     {}", self.config.demo_mode);

        if self.config.demo_mode {
            self.demo_loop().await;
            self.shutdown();
            return;
        }

        // Health logging runs beside the poll loop on the same runtime.
        let health_metrics = self.metrics.clone();
        let health_interval = self.config.health_log_interval_s;
        let mut health_running = self.running.clone();
        let health_task = tokio::spawn(async move {
            loop {
                let sleep = tokio::time::sleep(Duration::from_secs(health_interval));
                tokio::select! {
                    _ = sleep => {
                        match serde_json::to_string(&health_metrics.snapshot()) {
                            Ok(line) => info!("Health: {}", line),
                            Err(e) => warn!("Health snapshot failed: {}", e),
                        }
                    }
                    _ = health_running.changed() => break,
                }
            }
        });

        while self.is_running() {
            match self.poll_cycle().await {
                Ok(()) => {
                    self.metrics.reset_backoff();
                    if let Err(e) = self.cursors.persist() {
                        warn!("Could not persist cursors: {}", e);
                    }
                    self.interruptible_sleep(Duration::from_secs(self.config.poll_interval_s))
                        .await;
                }
                Err(e) => {
                    self.metrics.rpc_errors.inc();
                    let delay = self.metrics.increase_backoff();
                    warn!(
                        "Poll cycle failed: {} - retry in {}s (#{})",
                        e,
                        delay,
                        self.metrics.consecutive_errors.get()
                    );
                    self.interruptible_sleep(Duration::from_secs(delay)).await;
                }
            }
        }

        health_task.abort();
        self.shutdown();
    }

    fn shutdown(&self) {
        if let Err(e) = self.cursors.persist() {
            warn!("Could not persist cursors at shutdown: {}", e);
        }
        match serde_json::to_string_pretty(&self.metrics.snapshot()) {
            Ok(final_metrics) => info!("Relayer stopped gracefully. Final metrics: {}", final_metrics),
            Err(_) => info!("Relayer stopped gracefully"),
        }
    }

    /// Poll every event type once, in registration order.
    async fn poll_cycle(&mut self) -> anyhow::Result<()> {
        let handlers = self.handlers.clone();
        for (event_type, handler) in &handlers {
            if !self.is_running() {
                break;
            }
            self.poll_event_type(event_type, handler.as_ref()).await?;
        }
        self.metrics.mark_poll();
        Ok(())
    }

    async fn poll_event_type(
        &mut self,
        event_type: &str,
        handler: &dyn EventHandler,
    ) -> anyhow::Result<()> {
        let cursor = self.cursors.get(event_type).cloned();
        let page = self
            .rpc
            .query_events(event_type, cursor.as_ref(), PAGE_LIMIT)
            .await?;

        for event in &page.data {
            let key = event.id.dedup_key();
            if !self.dedup.insert(&key) {
                self.metrics.events_skipped.inc();
                continue;
            }

            // Handler failures are logged, not fatal: the cursor still
            // advances and the loop keeps draining.
            match handler.handle(event).await {
                Ok(()) => self.metrics.mark_event(),
                Err(e) => error!("Handler {} error for {}: {:#}", handler.name(), event_type, e),
            }
        }

        if let Some(next) = page.next_cursor {
            self.cursors.set(event_type, next);
        }
        Ok(())
    }

    /// Synthetic tick loop for environments without a deployed contract:
    /// exercises the entropy path without any RPC traffic.
    async fn demo_loop(&mut self) {
        info!("DEMO MODE - no deployed contract configured");
        let mut cycle: u64 = 0;
        while self.is_running() {
            cycle += 1;
            info!("Demo tick #{} (no RPC)", cycle);

            if cycle % 5 == 0 {
                match self.entropy.draw(self.config.qrng_shots).await {
                    Ok(counts) => {
                        self.metrics.rng_triggered.inc();
                        info!(
                            "Demo entropy draw: {} ones / {} shots",
                            counts.ones,
                            counts.total()
                        );
                    }
                    Err(e) => {
                        self.metrics.rng_failures.inc();
                        warn!("Demo entropy draw failed: {}", e);
                    }
                }
            }

            self.interruptible_sleep(Duration::from_secs(self.config.poll_interval_s))
                .await;
        }
    }
}
