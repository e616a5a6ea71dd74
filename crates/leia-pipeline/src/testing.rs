//! Deterministic transport for tests of hosts and of the pipeline itself.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use leia_core::{EventRecord, TelemetryError};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};

use crate::engine::BatchTransport;
use crate::queue::Batch;

/// Pre-programmed result for one `send` call.
#[derive(Debug)]
pub enum ScriptedResponse {
    /// Confirm the batch.
    Ok,
    /// Fail with this error.
    Fail(TelemetryError),
    /// Wait a duration, then apply the inner response.
    Delay(Duration, Box<ScriptedResponse>),
}

impl ScriptedResponse {
    /// Non-2xx answer from the endpoint.
    pub fn status(status: u16, body: &str) -> Self {
        Self::Fail(TelemetryError::from_status(status, body.to_string()))
    }

    /// Connection-level failure.
    pub fn offline() -> Self {
        Self::Fail(TelemetryError::Network("connection refused".into()))
    }

    /// Wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: ScriptedResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Transport that answers from a script and records every batch it sees.
///
/// Calls past the end of the script succeed. A gated transport holds each
/// call until [`release`](Self::release) hands out a permit.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedResponse>>,
    calls: Mutex<Vec<Vec<EventRecord>>>,
    call_count: watch::Sender<usize>,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Transport that accepts everything.
    pub fn new() -> Self {
        Self::with_script([])
    }

    /// Transport that plays `script` in order.
    pub fn with_script(script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            call_count: watch::Sender::new(0),
            gate: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every call until released.
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Let `n` held calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Append responses to the script.
    pub fn push(&self, response: ScriptedResponse) {
        self.script.lock().push_back(response);
    }

    /// Batches seen so far, in call order.
    pub fn calls(&self) -> Vec<Vec<EventRecord>> {
        self.calls.lock().clone()
    }

    /// Number of `send` calls started.
    pub fn call_count(&self) -> usize {
        *self.call_count.borrow()
    }

    /// Highest number of concurrent `send` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.call_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn send(&self, batch: &Batch) -> Result<(), TelemetryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        let _ = self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.calls.lock().push(batch.events().to_vec());
        self.call_count.send_modify(|count| *count += 1);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut response = self.script.lock().pop_front().unwrap_or(ScriptedResponse::Ok);
        loop {
            match response {
                ScriptedResponse::Ok => return Ok(()),
                ScriptedResponse::Fail(error) => return Err(error),
                ScriptedResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
            }
        }
    }
}
