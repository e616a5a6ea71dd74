//! The pipeline service object.
//!
//! Constructed once per process with injected storage and transport. Owns
//! the queue and the three background tasks (sync engine, ticker,
//! persister) and hands out [`Tracker`] and [`QueueReader`] views.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use leia_core::{BackoffPolicy, EventType, PlatformInfo, TelemetryError};
use leia_settings::{LeiaSettings, OverflowPolicy};
use leia_store::KeyValueStore;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder::RecordBuilder;
use crate::engine::{
    BatchTransport, EngineState, FlushOutcome, StatsSnapshot, SyncEngine, SyncHandle, SyncStats,
    run_ticker,
};
use crate::persister::run_persister;
use crate::queue::{DurableQueue, QueueReader};
use crate::session::SessionCorrelator;
use crate::tracker::Tracker;

/// Runtime parameters of a [`Pipeline`].
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Period of the timer trigger.
    pub sync_interval: Duration,
    /// Queue length that requests a flush right after an enqueue.
    pub flush_threshold: usize,
    /// Event types that request a flush right after they are enqueued.
    pub priority_events: HashSet<EventType>,
    /// Maximum pending records.
    pub max_queue_len: usize,
    /// What to drop when the queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Upper bound on the final flush at shutdown.
    pub shutdown_timeout: Duration,
    /// Delay policy after failed flushes.
    pub backoff: BackoffPolicy,
    /// Metadata stamped on every record.
    pub platform: PlatformInfo,
}

impl PipelineConfig {
    /// Derive the pipeline parameters from loaded settings.
    pub fn from_settings(settings: &LeiaSettings) -> Self {
        let telemetry = &settings.telemetry;
        let builder = RecordBuilder::from_host(
            Some(settings.host.host_version.as_str()),
            Some(settings.host.extension_version.as_str()),
        );
        Self {
            sync_interval: telemetry.sync_interval(),
            flush_threshold: telemetry.flush_threshold,
            priority_events: telemetry
                .priority_events
                .iter()
                .map(|tag| EventType::from(tag.as_str()))
                .filter(|event_type| !event_type.is_empty())
                .collect(),
            max_queue_len: telemetry.max_queue_len,
            overflow_policy: telemetry.overflow_policy,
            shutdown_timeout: telemetry.shutdown_timeout(),
            backoff: telemetry.backoff.clone(),
            platform: builder.platform().clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_settings(&LeiaSettings::default())
    }
}

/// A running pipeline.
pub struct Pipeline {
    queue: Arc<DurableQueue>,
    sessions: Arc<SessionCorrelator>,
    tracker: Tracker,
    sync: SyncHandle,
    state: watch::Receiver<EngineState>,
    stats: Arc<SyncStats>,
    cancel: CancellationToken,
    engine_task: JoinHandle<()>,
    ticker_task: JoinHandle<()>,
    persister_task: JoinHandle<()>,
}

impl Pipeline {
    /// Hydrate the queue and session from `store` and start the background tasks.
    ///
    /// No flush is attempted until the first trigger. Fails only when the
    /// persisted queue cannot be read at all.
    pub async fn start(
        config: PipelineConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn BatchTransport>,
    ) -> Result<Self, TelemetryError> {
        let queue = Arc::new(
            DurableQueue::load(Arc::clone(&store), config.max_queue_len, config.overflow_policy).await?,
        );
        let sessions = Arc::new(SessionCorrelator::hydrate(store).await);
        let stats = Arc::new(SyncStats::default());

        let (engine, state) = SyncEngine::new(
            Arc::clone(&queue),
            transport,
            config.backoff.clone(),
            config.shutdown_timeout,
            Arc::clone(&stats),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = SyncHandle::from_sender(tx);
        let cancel = CancellationToken::new();
        let persist = Arc::new(Notify::new());

        let engine_task = tokio::spawn(engine.run(rx));
        let ticker_task = tokio::spawn(run_ticker(config.sync_interval, sync.clone(), cancel.clone()));
        let persister_task = tokio::spawn(run_persister(
            Arc::clone(&queue),
            Arc::clone(&persist),
            cancel.clone(),
        ));

        let tracker = Tracker::new(
            RecordBuilder::new(config.platform.clone()),
            Arc::clone(&queue),
            Arc::clone(&sessions),
            sync.clone(),
            persist,
            config.flush_threshold,
            config.priority_events.clone(),
        );

        info!(
            pending = queue.len(),
            capacity = queue.capacity(),
            sync_interval_ms = u64::try_from(config.sync_interval.as_millis()).unwrap_or(u64::MAX),
            flush_threshold = config.flush_threshold,
            "telemetry pipeline started"
        );

        Ok(Self {
            queue,
            sessions,
            tracker,
            sync,
            state,
            stats,
            cancel,
            engine_task,
            ticker_task,
            persister_task,
        })
    }

    /// Producer handle.
    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }

    /// Read-only view of the pending records.
    pub fn reader(&self) -> QueueReader {
        QueueReader::new(Arc::clone(&self.queue))
    }

    /// Session correlator shared with the tracker.
    pub fn sessions(&self) -> Arc<SessionCorrelator> {
        Arc::clone(&self.sessions)
    }

    /// Current engine state.
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Subscribe to engine state changes.
    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.state.clone()
    }

    /// Engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run one flush now, ignoring any backoff, and wait for the outcome.
    pub async fn flush_now(&self) -> Result<FlushOutcome, TelemetryError> {
        self.sync.flush_now().await
    }

    /// Drop every pending record and persist the empty queue.
    pub async fn clear(&self) -> Result<usize, TelemetryError> {
        let removed = self.queue.clear();
        self.queue.persist().await?;
        warn!(removed, "pending events cleared");
        Ok(removed)
    }

    /// Stop the background tasks after a time-bounded final flush.
    ///
    /// The queue is persisted before the final flush so unsent records
    /// survive even if the flush times out.
    pub async fn shutdown(self) -> FlushOutcome {
        self.cancel.cancel();
        for (name, task) in [("ticker", self.ticker_task), ("persister", self.persister_task)] {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "background task ended abnormally");
            }
        }

        if let Err(e) = self.queue.persist().await {
            warn!(error = %e, "failed to persist pending events at shutdown");
        }

        let outcome = match self.sync.shutdown().await {
            Ok(outcome) => outcome,
            Err(error) => FlushOutcome::Failed { error },
        };
        if let Err(e) = self.engine_task.await {
            warn!(task = "engine", error = %e, "background task ended abnormally");
        }

        info!(pending = self.queue.len(), %outcome, "telemetry pipeline stopped");
        debug!(stats = ?self.stats.snapshot(), "final sync stats");
        outcome
    }
}
