use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use leia_core::TelemetryError;
use serde::Serialize;
use tokio::time::Instant;

/// Sync engine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for a trigger.
    Idle,
    /// A batch is in flight.
    Flushing,
    /// A flush failed; triggers are deferred until `until`.
    Backoff {
        /// When flushing may resume.
        until: Instant,
        /// Consecutive failed flushes.
        failures: u32,
    },
}

impl EngineState {
    /// Short lowercase label for logs and status output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Flushing => "flushing",
            Self::Backoff { .. } => "backoff",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a flush was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Periodic timer tick.
    Timer,
    /// Queue reached the flush threshold after an enqueue.
    Threshold,
    /// A priority event was enqueued.
    Priority,
    /// Explicit request from the host.
    Manual,
    /// Final best-effort flush at shutdown.
    Shutdown,
}

impl Trigger {
    /// Short lowercase label for logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Threshold => "threshold",
            Self::Priority => "priority",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one flush cycle.
#[derive(Clone, Debug)]
pub enum FlushOutcome {
    /// Nothing was pending; no request was made.
    Empty,
    /// The endpoint accepted the batch.
    Delivered {
        /// Records in the batch.
        count: usize,
    },
    /// The batch was not confirmed and stays queued.
    Failed {
        /// What went wrong.
        error: TelemetryError,
    },
}

impl FlushOutcome {
    /// Whether a batch was confirmed.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Whether the attempt failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for FlushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("nothing to flush"),
            Self::Delivered { count } => write!(f, "delivered {count} events"),
            Self::Failed { error } => write!(f, "flush failed: {error}"),
        }
    }
}

/// Counters updated by the engine.
#[derive(Debug, Default)]
pub(crate) struct SyncStats {
    attempts: AtomicU64,
    delivered_batches: AtomicU64,
    delivered_events: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU32,
}

impl SyncStats {
    pub(crate) fn record_attempt(&self) {
        let _ = self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self, events: usize) {
        let _ = self.delivered_batches.fetch_add(1, Ordering::Relaxed);
        let _ = self.delivered_events.fetch_add(events as u64, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) -> u32 {
        let _ = self.failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            delivered_batches: self.delivered_batches.load(Ordering::Relaxed),
            delivered_events: self.delivered_events.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Network calls made.
    pub attempts: u64,
    /// Batches confirmed by the endpoint.
    pub delivered_batches: u64,
    /// Records in confirmed batches.
    pub delivered_events: u64,
    /// Failed network calls.
    pub failures: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}
