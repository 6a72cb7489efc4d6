//! Relayer crash-safety properties: durable cursors, at-most-once dispatch
//! within a process lifetime, and backoff growth/reset against a scripted
//! RPC.

use anyhow::Result;
use async_trait::async_trait;
use quantvault::domain::ports::{ChainEvent, EventId, EventPage, EventRpc};
use quantvault::infrastructure::relayer::cursor::CursorStore;
use quantvault::infrastructure::relayer::dedup::DedupCache;
use quantvault::infrastructure::relayer::metrics::RelayerMetrics;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

const EVENT_TYPE: &str = "0xpkg::portfolio::RebalanceExecuted";

fn event(digest: &str, seq: u64) -> ChainEvent {
    ChainEvent {
        id: EventId {
            tx_digest: digest.to_string(),
            event_seq: seq.to_string(),
        },
        event_type: EVENT_TYPE.to_string(),
        timestamp_ms: seq,
        parsed_json: serde_json::json!({}),
    }
}

#[test]
fn cursor_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cursors.json");

    {
        let mut store = CursorStore::load(&path);
        assert!(store.get(EVENT_TYPE).is_none(), "fresh store starts at null");
        store.set(EVENT_TYPE, serde_json::json!({"txDigest": "0xaa", "eventSeq": "7"}));
        store.persist().unwrap();
    }

    // "Restart": a new store sees the persisted position.
    let store = CursorStore::load(&path);
    let cursor = store.get(EVENT_TYPE).expect("cursor must be non-null after processing");
    assert_eq!(cursor["eventSeq"], "7");
}

#[test]
fn corrupt_cursor_file_starts_at_null() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cursors.json");
    std::fs::write(&path, "][ definitely not json").unwrap();

    let store = CursorStore::load(&path);
    assert!(store.is_empty());
    assert!(store.get(EVENT_TYPE).is_none());
}

#[test]
fn dedup_never_dispatches_twice() {
    let mut dedup = DedupCache::new();
    let mut dispatched = Vec::new();

    // The same page replayed three times (RPC hiccups, cursor not advanced).
    for _ in 0..3 {
        for e in [event("0xaa", 0), event("0xaa", 1), event("0xbb", 0)] {
            if dedup.insert(&e.id.dedup_key()) {
                dispatched.push(e.id.dedup_key());
            }
        }
    }

    assert_eq!(dispatched, vec!["0xaa:0", "0xaa:1", "0xbb:0"]);
}

#[test]
fn dedup_distinguishes_seq_within_one_tx() {
    let mut dedup = DedupCache::new();
    assert!(dedup.insert(&event("0xaa", 0).id.dedup_key()));
    assert!(dedup.insert(&event("0xaa", 1).id.dedup_key()));
    assert!(!dedup.insert(&event("0xaa", 1).id.dedup_key()));
}

/// RPC double that fails a configured number of times, then succeeds.
struct FlakyRpc {
    failures_left: Mutex<usize>,
    calls: AtomicUsize,
}

#[async_trait]
impl EventRpc for FlakyRpc {
    async fn query_events(
        &self,
        _event_type: &str,
        _cursor: Option<&serde_json::Value>,
        _limit: usize,
    ) -> Result<EventPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures_left.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            anyhow::bail!("connection refused");
        }
        Ok(EventPage {
            data: vec![event("0xcc", 0)],
            next_cursor: Some(serde_json::json!({"txDigest": "0xcc", "eventSeq": "0"})),
        })
    }
}

#[tokio::test]
async fn backoff_grows_on_failure_and_resets_on_success() {
    let rpc = FlakyRpc {
        failures_left: Mutex::new(3),
        calls: AtomicUsize::new(0),
    };
    let metrics = RelayerMetrics::new(1, 60).unwrap();

    // Drive the poll/backoff contract directly: each failure doubles, the
    // first success resets.
    let mut delays = Vec::new();
    loop {
        match rpc.query_events(EVENT_TYPE, None, 25).await {
            Ok(page) => {
                metrics.reset_backoff();
                assert_eq!(page.data.len(), 1);
                break;
            }
            Err(_) => {
                metrics.rpc_errors.inc();
                delays.push(metrics.increase_backoff());
            }
        }
    }

    assert_eq!(delays, vec![2, 4, 8]);
    assert_eq!(metrics.backoff_s(), 1, "success must reset to the initial value");
    assert_eq!(metrics.consecutive_errors.get(), 0);
    assert_eq!(metrics.rpc_errors.get(), 3);
    assert_eq!(rpc.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn backoff_caps_at_maximum() {
    let metrics = RelayerMetrics::new(1, 60).unwrap();
    let mut last = 0;
    for _ in 0..20 {
        last = metrics.increase_backoff();
    }
    assert_eq!(last, 60);
    assert_eq!(metrics.consecutive_errors.get(), 20);
}

#[test]
fn snapshot_serializes_all_counters() {
    let metrics = RelayerMetrics::new(1, 60).unwrap();
    metrics.mark_event();
    metrics.mark_poll();
    metrics.rng_triggered.inc();

    let line = serde_json::to_string(&metrics.snapshot()).unwrap();
    for key in [
        "uptime_s",
        "events_processed",
        "events_skipped",
        "rpc_errors",
        "rng_triggered",
        "rng_failures",
        "consecutive_errors",
        "current_backoff_s",
        "last_event_time",
        "last_poll_time",
    ] {
        assert!(line.contains(key), "snapshot missing {key}");
    }
}
