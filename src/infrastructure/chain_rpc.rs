//! JSON-RPC 2.0 client for the chain's event-query surface.
//!
//! Thin and stateless apart from the request counter; retries and backoff
//! belong to the relayer engine, not here.

use crate::domain::ports::{ChainEvent, EventId, EventPage, EventRpc};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Per-call budget; a slow fullnode surfaces as a backoff, not a hang.
const RPC_TIMEOUT: Duration = Duration::from_secs(15);

pub struct JsonRpcEventClient {
    url: String,
    client: reqwest::Client,
    request_id: AtomicU64,
}

impl JsonRpcEventClient {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .context("failed to build RPC HTTP client")?;
        Ok(Self {
            url: url.to_string(),
            client,
            request_id: AtomicU64::new(0),
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC {} (id {})", method, id);
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("RPC request failed")?
            .error_for_status()
            .context("RPC returned an error status")?;

        let body: serde_json::Value = response.json().await.context("RPC body is not JSON")?;
        if let Some(err) = body.get("error") {
            bail!("RPC error: {err}");
        }
        Ok(body.get("result").cloned().unwrap_or_default())
    }
}

#[async_trait]
impl EventRpc for JsonRpcEventClient {
    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&serde_json::Value>,
        limit: usize,
    ) -> Result<EventPage> {
        let params = serde_json::json!([
            { "MoveEventType": event_type },
            cursor,
            limit,
            false,
        ]);
        let result = self.call("suix_queryEvents", params).await?;

        let data = result
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();

        let events = data
            .into_iter()
            .map(|raw| ChainEvent {
                id: EventId {
                    tx_digest: raw
                        .pointer("/id/txDigest")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    event_seq: raw
                        .pointer("/id/eventSeq")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| {
                            raw.pointer("/id/eventSeq")
                                .and_then(|v| v.as_u64())
                                .map(|n| n.to_string())
                                .unwrap_or_default()
                        }),
                },
                event_type: raw
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or(event_type)
                    .to_string(),
                timestamp_ms: raw
                    .get("timestampMs")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<u64>().ok())
                    .or_else(|| raw.get("timestampMs").and_then(|v| v.as_u64()))
                    .unwrap_or(0),
                parsed_json: raw.get("parsedJson").cloned().unwrap_or_default(),
            })
            .collect();

        Ok(EventPage {
            data: events,
            next_cursor: result.get("nextCursor").filter(|c| !c.is_null()).cloned(),
        })
    }
}
