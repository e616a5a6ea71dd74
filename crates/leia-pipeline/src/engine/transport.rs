//! Batch delivery to the ingestion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use leia_core::{EventRecord, TelemetryError};
use serde::Serialize;
use tracing::debug;

use crate::queue::Batch;

/// Delivers one batch; success means the endpoint confirmed all of it.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Send `batch`. Any error leaves the batch queued.
    async fn send(&self, batch: &Batch) -> Result<(), TelemetryError>;
}

#[derive(Serialize)]
struct WireBatch<'a> {
    events: &'a [EventRecord],
}

/// `POST {"events": [...]}` over HTTP; any 2xx is success.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Transport for `endpoint`, sending `api_key` as `X-API-Key` when set.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::Network(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
        })
    }

    /// Target URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, e: &reqwest::Error) -> TelemetryError {
        if e.is_timeout() {
            TelemetryError::Timeout(self.timeout)
        } else {
            TelemetryError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn send(&self, batch: &Batch) -> Result<(), TelemetryError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&WireBatch { events: batch.events() });
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(|e| self.classify(&e))?;
        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), batch_size = batch.len(), "batch accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TelemetryError::from_status(status.as_u16(), body))
    }
}
