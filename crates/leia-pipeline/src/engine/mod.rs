//! Sync engine: decides when to flush and reconciles the queue.
//!
//! All flush requests go through one unbounded command channel consumed by
//! a single task ([`SyncEngine::run`]), so at most one batch is ever in
//! flight. Requests that arrive while a flush is running are coalesced
//! into it; a priority request earns exactly one follow-up after a success.
//!
//! ```text
//!            trigger                    2xx
//!   IDLE ─────────────▶ FLUSHING ───────────────▶ IDLE
//!    ▲                     │ error / non-2xx
//!    │   delay expired     ▼
//!    └─────────────── BACKOFF  (triggers recorded, one flush on expiry)
//! ```

mod scheduler;
mod state;
mod transport;

pub(crate) use scheduler::run_ticker;
pub(crate) use state::SyncStats;
pub use state::{EngineState, FlushOutcome, StatsSnapshot, Trigger};
pub use transport::{BatchTransport, HttpTransport};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use leia_core::{BackoffPolicy, TelemetryError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::queue::DurableQueue;

/// Messages consumed by the engine loop.
#[derive(Debug)]
pub(crate) enum Command {
    /// Request a flush; coalesced with any flush in progress.
    Flush(Trigger),
    /// Flush now, bypassing backoff, and report the outcome.
    FlushNow(oneshot::Sender<FlushOutcome>),
    /// Final bounded flush, then stop.
    Shutdown(oneshot::Sender<FlushOutcome>),
}

/// Cheap, cloneable sender of flush requests.
#[derive(Clone, Debug)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SyncHandle {
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    /// Ask for a flush. Returns `false` once the engine has stopped.
    pub fn request(&self, trigger: Trigger) -> bool {
        self.tx.send(Command::Flush(trigger)).is_ok()
    }

    /// Flush immediately (ignoring backoff) and wait for the outcome.
    pub async fn flush_now(&self) -> Result<FlushOutcome, TelemetryError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Command::FlushNow(reply))
            .map_err(|_| TelemetryError::Closed)?;
        outcome.await.map_err(|_| TelemetryError::Closed)
    }

    pub(crate) async fn shutdown(&self) -> Result<FlushOutcome, TelemetryError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Command::Shutdown(reply))
            .map_err(|_| TelemetryError::Closed)?;
        outcome.await.map_err(|_| TelemetryError::Closed)
    }
}

/// The single consumer of flush requests.
pub struct SyncEngine {
    queue: Arc<DurableQueue>,
    transport: Arc<dyn BatchTransport>,
    backoff: BackoffPolicy,
    shutdown_timeout: Duration,
    state: EngineState,
    state_tx: watch::Sender<EngineState>,
    stats: Arc<SyncStats>,
}

impl SyncEngine {
    pub(crate) fn new(
        queue: Arc<DurableQueue>,
        transport: Arc<dyn BatchTransport>,
        backoff: BackoffPolicy,
        shutdown_timeout: Duration,
        stats: Arc<SyncStats>,
    ) -> (Self, watch::Receiver<EngineState>) {
        let (state_tx, state_rx) = watch::channel(EngineState::Idle);
        let engine = Self {
            queue,
            transport,
            backoff,
            shutdown_timeout,
            state: EngineState::Idle,
            state_tx,
            stats,
        };
        (engine, state_rx)
    }

    /// Process commands until shutdown or until every sender is dropped.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut backlog: VecDeque<Command> = VecDeque::new();
        let mut pending: Option<Trigger> = None;

        loop {
            let command = if let Some(command) = backlog.pop_front() {
                command
            } else if let EngineState::Backoff { until, .. } = self.state {
                tokio::select! {
                    biased;
                    command = rx.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                    () = tokio::time::sleep_until(until) => {
                        self.set_state(EngineState::Idle);
                        match pending.take() {
                            Some(trigger) => {
                                debug!(%trigger, "backoff expired, running deferred flush");
                                Command::Flush(trigger)
                            }
                            None => continue,
                        }
                    }
                }
            } else {
                match rx.recv().await {
                    Some(command) => command,
                    None => break,
                }
            };

            match command {
                Command::Flush(trigger) => {
                    if matches!(self.state, EngineState::Backoff { .. }) {
                        debug!(%trigger, "in backoff, deferring flush");
                        pending = Some(trigger);
                        continue;
                    }
                    let outcome = self.flush_once(trigger).await;
                    pending = None;
                    Self::coalesce(&mut rx, &outcome, &mut backlog);
                }
                Command::FlushNow(reply) => {
                    let outcome = self.flush_once(Trigger::Manual).await;
                    pending = None;
                    Self::coalesce(&mut rx, &outcome, &mut backlog);
                    let _ = reply.send(outcome);
                }
                Command::Shutdown(reply) => {
                    let outcome = self.final_flush().await;
                    let _ = reply.send(outcome);
                    break;
                }
            }
        }

        debug!("sync engine stopped");
    }

    /// Absorb requests that arrived during the last flush.
    ///
    /// Plain triggers are satisfied by the flush that just ran. A priority
    /// trigger gets one follow-up, and only if that flush succeeded; after a
    /// failure the next timer tick retries. Non-flush commands are kept.
    fn coalesce(
        rx: &mut mpsc::UnboundedReceiver<Command>,
        outcome: &FlushOutcome,
        backlog: &mut VecDeque<Command>,
    ) {
        let mut coalesced = 0usize;
        let mut follow_up = false;
        while let Ok(command) = rx.try_recv() {
            match command {
                Command::Flush(Trigger::Priority) => {
                    follow_up = true;
                    coalesced += 1;
                }
                Command::Flush(_) => coalesced += 1,
                other => backlog.push_back(other),
            }
        }
        if coalesced > 0 {
            debug!(coalesced, "coalesced flush requests");
        }
        if follow_up && outcome.is_delivered() {
            backlog.push_front(Command::Flush(Trigger::Priority));
        }
    }

    /// One flush cycle: snapshot, send, reconcile.
    async fn flush_once(&mut self, trigger: Trigger) -> FlushOutcome {
        // Retries a write that failed earlier; no-op when storage is current.
        if let Err(e) = self.queue.persist().await {
            warn!(%trigger, error = %e, "failed to persist queue before flush");
        }

        let batch = self.queue.snapshot_batch();
        if batch.is_empty() {
            debug!(%trigger, "nothing to flush");
            self.set_state(EngineState::Idle);
            return FlushOutcome::Empty;
        }

        self.set_state(EngineState::Flushing);
        self.stats.record_attempt();
        let batch_size = batch.len();
        debug!(%trigger, batch_size, "flushing batch");

        match self.transport.send(&batch).await {
            Ok(()) => {
                let removed = self.queue.acknowledge(&batch);
                if let Err(e) = self.queue.persist().await {
                    warn!(error = %e, "failed to persist queue after delivery");
                }
                self.stats.record_success(batch_size);
                self.set_state(EngineState::Idle);
                info!(
                    %trigger,
                    batch_size,
                    removed,
                    queue_len = self.queue.len(),
                    "batch delivered"
                );
                FlushOutcome::Delivered { count: batch_size }
            }
            Err(error) => {
                let failures = self.stats.record_failure();
                let delay = self.backoff.sample(failures);
                self.set_state(EngineState::Backoff {
                    until: Instant::now() + delay,
                    failures,
                });
                let status = match &error {
                    TelemetryError::Server { status, .. } => Some(*status),
                    _ => None,
                };
                warn!(
                    %trigger,
                    batch_size,
                    kind = error.error_kind(),
                    status,
                    error = %error,
                    failures,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "flush failed, batch kept"
                );
                FlushOutcome::Failed { error }
            }
        }
    }

    /// Best-effort flush bounded by the shutdown timeout; ignores backoff.
    async fn final_flush(&mut self) -> FlushOutcome {
        match tokio::time::timeout(self.shutdown_timeout, self.flush_once(Trigger::Shutdown)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.set_state(EngineState::Idle);
                warn!(timeout_ms = u64::try_from(self.shutdown_timeout.as_millis()).unwrap_or(u64::MAX), "final flush timed out");
                FlushOutcome::Failed {
                    error: TelemetryError::Timeout(self.shutdown_timeout),
                }
            }
        }
    }

    fn set_state(&mut self, state: EngineState) {
        self.state = state;
        let _ = self.state_tx.send_replace(state);
    }
}
