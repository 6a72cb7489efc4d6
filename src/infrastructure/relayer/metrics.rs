//! Relayer health metrics: prometheus counters/gauges behind a small facade,
//! plus a serializable snapshot logged on the health cadence and at shutdown.
//! Push/log only; the relayer never serves HTTP.

use prometheus::{Gauge, IntCounter, IntGauge, Opts, Registry};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct RelayerMetrics {
    #[allow(dead_code)]
    registry: Arc<Registry>,
    pub events_processed: IntCounter,
    pub events_skipped: IntCounter,
    pub rpc_errors: IntCounter,
    pub rng_triggered: IntCounter,
    pub rng_failures: IntCounter,
    pub consecutive_errors: IntGauge,
    pub current_backoff_s: Gauge,
    pub last_event_time: Gauge,
    pub last_poll_time: Gauge,
    started_at: Instant,
    backoff_s: Arc<AtomicU64>,
    initial_backoff_s: u64,
    max_backoff_s: u64,
}

/// Snapshot shape for the periodic health log line.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_s: u64,
    pub events_processed: u64,
    pub events_skipped: u64,
    pub rpc_errors: u64,
    pub rng_triggered: u64,
    pub rng_failures: u64,
    pub consecutive_errors: i64,
    pub current_backoff_s: u64,
    pub last_event_time: f64,
    pub last_poll_time: f64,
}

impl RelayerMetrics {
    pub fn new(initial_backoff_s: u64, max_backoff_s: u64) -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_processed = IntCounter::with_opts(Opts::new(
            "quantvault_relayer_events_processed_total",
            "Events dispatched to a handler",
        ))?;
        registry.register(Box::new(events_processed.clone()))?;

        let events_skipped = IntCounter::with_opts(Opts::new(
            "quantvault_relayer_events_skipped_total",
            "Events dropped as duplicates",
        ))?;
        registry.register(Box::new(events_skipped.clone()))?;

        let rpc_errors = IntCounter::with_opts(Opts::new(
            "quantvault_relayer_rpc_errors_total",
            "Failed poll cycles",
        ))?;
        registry.register(Box::new(rpc_errors.clone()))?;

        let rng_triggered = IntCounter::with_opts(Opts::new(
            "quantvault_relayer_rng_triggered_total",
            "Successful entropy draws",
        ))?;
        registry.register(Box::new(rng_triggered.clone()))?;

        let rng_failures = IntCounter::with_opts(Opts::new(
            "quantvault_relayer_rng_failures_total",
            "Failed entropy draws",
        ))?;
        registry.register(Box::new(rng_failures.clone()))?;

        let consecutive_errors = IntGauge::with_opts(Opts::new(
            "quantvault_relayer_consecutive_errors",
            "Consecutive failed poll cycles",
        ))?;
        registry.register(Box::new(consecutive_errors.clone()))?;

        let current_backoff_s = Gauge::with_opts(Opts::new(
            "quantvault_relayer_current_backoff_seconds",
            "Current backoff delay",
        ))?;
        registry.register(Box::new(current_backoff_s.clone()))?;

        let last_event_time = Gauge::with_opts(Opts::new(
            "quantvault_relayer_last_event_unix_seconds",
            "Unix time of the last processed event",
        ))?;
        registry.register(Box::new(last_event_time.clone()))?;

        let last_poll_time = Gauge::with_opts(Opts::new(
            "quantvault_relayer_last_poll_unix_seconds",
            "Unix time of the last completed poll cycle",
        ))?;
        registry.register(Box::new(last_poll_time.clone()))?;

        current_backoff_s.set(initial_backoff_s as f64);

        Ok(Self {
            registry: Arc::new(registry),
            events_processed,
            events_skipped,
            rpc_errors,
            rng_triggered,
            rng_failures,
            consecutive_errors,
            current_backoff_s,
            last_event_time,
            last_poll_time,
            started_at: Instant::now(),
            backoff_s: Arc::new(AtomicU64::new(initial_backoff_s)),
            initial_backoff_s,
            max_backoff_s,
        })
    }

    /// Current backoff delay in seconds.
    pub fn backoff_s(&self) -> u64 {
        self.backoff_s.load(Ordering::Relaxed)
    }

    /// Successful cycle: clear the error streak and reset the delay.
    pub fn reset_backoff(&self) {
        self.consecutive_errors.set(0);
        self.backoff_s.store(self.initial_backoff_s, Ordering::Relaxed);
        self.current_backoff_s.set(self.initial_backoff_s as f64);
    }

    /// Failed cycle: bump the streak and double the delay up to the cap.
    /// Returns the delay to sleep before the next attempt.
    pub fn increase_backoff(&self) -> u64 {
        self.consecutive_errors.inc();
        let next = (self.backoff_s.load(Ordering::Relaxed) * 2).min(self.max_backoff_s);
        self.backoff_s.store(next, Ordering::Relaxed);
        self.current_backoff_s.set(next as f64);
        next
    }

    pub fn mark_event(&self) {
        self.events_processed.inc();
        self.last_event_time.set(unix_now());
    }

    pub fn mark_poll(&self) {
        self.last_poll_time.set(unix_now());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_s: self.started_at.elapsed().as_secs(),
            events_processed: self.events_processed.get(),
            events_skipped: self.events_skipped.get(),
            rpc_errors: self.rpc_errors.get(),
            rng_triggered: self.rng_triggered.get(),
            rng_failures: self.rng_failures.get(),
            consecutive_errors: self.consecutive_errors.get(),
            current_backoff_s: self.backoff_s(),
            last_event_time: self.last_event_time.get(),
            last_poll_time: self.last_poll_time.get(),
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
