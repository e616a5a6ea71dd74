//! Delivery pipeline settings.

use std::time::Duration;

use leia_core::BackoffPolicy;
use serde::{Deserialize, Serialize};

/// What the durable queue does when it is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Evict the oldest pending record to make room.
    #[default]
    DropOldest,
    /// Reject the incoming record.
    DropNewest,
}

/// Sync engine, queue, and transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySettings {
    /// Ingestion endpoint receiving `POST {"events": [...]}`.
    pub endpoint: String,
    /// Optional key sent as `X-API-Key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Periodic flush interval in milliseconds.
    pub sync_interval_ms: u64,
    /// Queue length that triggers an immediate flush after an enqueue.
    pub flush_threshold: usize,
    /// Event types whose enqueue triggers an immediate flush.
    pub priority_events: Vec<String>,
    /// Maximum pending records kept.
    pub max_queue_len: usize,
    /// Eviction rule once `max_queue_len` is reached.
    pub overflow_policy: OverflowPolicy,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Upper bound on the final flush at shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Delay policy after failed flushes.
    pub backoff: BackoffPolicy,
}

impl TelemetrySettings {
    /// Periodic flush interval.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Final-flush bound at shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/api/analytics".to_string(),
            api_key: None,
            sync_interval_ms: 300_000,
            flush_threshold: 10,
            priority_events: [
                "USER_LOGIN",
                "USER_LOGOUT",
                "SESSION_START",
                "SESSION_END",
                "PAIR_SESSION_START",
                "PAIR_SESSION_END",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_queue_len: 10_000,
            overflow_policy: OverflowPolicy::DropOldest,
            request_timeout_ms: 30_000,
            shutdown_timeout_ms: 5_000,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let t: TelemetrySettings =
            serde_json::from_str(r#"{"flushThreshold": 3, "overflowPolicy": "dropNewest"}"#).unwrap();
        assert_eq!(t.flush_threshold, 3);
        assert_eq!(t.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(t.sync_interval(), Duration::from_secs(300));
        assert_eq!(t.priority_events.len(), 6);
    }

    #[test]
    fn api_key_omitted_when_absent() {
        let json = serde_json::to_value(TelemetrySettings::default()).unwrap();
        assert!(json.get("apiKey").is_none());
    }

    #[test]
    fn durations() {
        let t = TelemetrySettings::default();
        assert_eq!(t.request_timeout(), Duration::from_secs(30));
        assert_eq!(t.shutdown_timeout(), Duration::from_secs(5));
    }
}
