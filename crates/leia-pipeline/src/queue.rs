//! Durable, insertion-ordered queue of pending event records.
//!
//! The in-memory list is the source of truth for the running process. Its
//! full image is written under [`keys::PENDING_EVENTS`] by [`DurableQueue::persist`];
//! only what a completed write captured survives a restart.
//!
//! Every record gets a sequence number when appended. A [`Batch`] remembers
//! the sequence of its first record, so acknowledging it removes exactly the
//! delivered records even if overflow eviction or `clear` shifted the queue
//! while the batch was in transit.

use std::collections::VecDeque;
use std::sync::Arc;

use leia_core::{EventRecord, TelemetryError};
use leia_settings::OverflowPolicy;
use leia_store::{KeyValueStore, StoreError, keys};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

/// Result of an append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnqueueOutcome {
    /// Whether the record was appended.
    pub accepted: bool,
    /// Records evicted (or rejected) to respect capacity.
    pub dropped: usize,
    /// Queue length after the call.
    pub len: usize,
}

/// Frozen snapshot of the queue taken when a flush starts.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    first_seq: u64,
    events: Vec<EventRecord>,
}

impl Batch {
    /// Records in delivery order.
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch holds nothing.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

struct QueueInner {
    records: VecDeque<EventRecord>,
    /// Sequence number of `records[0]`.
    head_seq: u64,
    revision: u64,
    persisted_revision: u64,
}

impl QueueInner {
    fn pop_front_n(&mut self, n: usize) -> usize {
        let n = n.min(self.records.len());
        drop(self.records.drain(..n));
        self.head_seq += n as u64;
        if n > 0 {
            self.revision += 1;
        }
        n
    }
}

/// Ordered pending-event store backed by a [`KeyValueStore`].
pub struct DurableQueue {
    inner: Mutex<QueueInner>,
    store: Arc<dyn KeyValueStore>,
    write_lock: tokio::sync::Mutex<()>,
    capacity: usize,
    overflow: OverflowPolicy,
}

impl DurableQueue {
    /// Empty queue.
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize, overflow: OverflowPolicy) -> Self {
        Self::with_records(store, Vec::new(), capacity, overflow)
    }

    /// Queue hydrated from the persisted image.
    ///
    /// An image larger than `capacity` is trimmed according to `overflow`.
    /// When the stored image had to be repaired (undecodable, malformed
    /// entries, trimmed), the queue starts dirty so the next persist
    /// rewrites it.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        capacity: usize,
        overflow: OverflowPolicy,
    ) -> Result<Self, TelemetryError> {
        let (mut records, mut repaired) = Self::read_image(store.as_ref()).await?;
        if records.len() > capacity {
            let excess = records.len() - capacity;
            warn!(excess, capacity, "persisted queue exceeds capacity, trimming");
            match overflow {
                OverflowPolicy::DropOldest => drop(records.drain(..excess)),
                OverflowPolicy::DropNewest => records.truncate(capacity),
            }
            repaired = true;
        }
        debug!(count = records.len(), repaired, "pending events loaded");
        let queue = Self::with_records(store, records, capacity, overflow);
        if repaired {
            queue.inner.lock().revision = 1;
        }
        Ok(queue)
    }

    fn with_records(
        store: Arc<dyn KeyValueStore>,
        records: Vec<EventRecord>,
        capacity: usize,
        overflow: OverflowPolicy,
    ) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                records: records.into(),
                head_seq: 0,
                revision: 0,
                persisted_revision: 0,
            }),
            store,
            write_lock: tokio::sync::Mutex::new(()),
            capacity: capacity.max(1),
            overflow,
        }
    }

    /// Read the persisted image in original order.
    ///
    /// Absent storage yields an empty list, and so does an image that is not
    /// JSON at all (a torn write). Entries that no longer decode are dropped
    /// and logged so one bad record cannot block the queue. Only failures to
    /// reach storage are errors.
    pub async fn load_all(store: &dyn KeyValueStore) -> Result<Vec<EventRecord>, TelemetryError> {
        Ok(Self::read_image(store).await?.0)
    }

    /// Decoded records plus whether anything in the image was discarded.
    async fn read_image(store: &dyn KeyValueStore) -> Result<(Vec<EventRecord>, bool), TelemetryError> {
        let image = match store.get(keys::PENDING_EVENTS).await {
            Ok(Some(image)) => image,
            Ok(None) => return Ok((Vec::new(), false)),
            Err(StoreError::Json(e)) => {
                warn!(error = %e, "persisted queue is not valid JSON, starting empty");
                return Ok((Vec::new(), true));
            }
            Err(e) => return Err(e.into()),
        };
        let Value::Array(items) = image else {
            warn!("persisted queue is not an array, ignoring");
            return Ok((Vec::new(), true));
        };

        let total = items.len();
        let mut records = Vec::with_capacity(total);
        for (index, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<EventRecord>(item) {
                Ok(record) => records.push(record),
                Err(e) => warn!(index, error = %e, "dropping malformed persisted event"),
            }
        }
        let repaired = records.len() < total;
        Ok((records, repaired))
    }

    /// Append a record. Never blocks on I/O; call [`persist`](Self::persist)
    /// (or notify the persister) to make it durable.
    pub fn enqueue(&self, record: EventRecord) -> EnqueueOutcome {
        let mut inner = self.inner.lock();
        let mut dropped = 0;

        if inner.records.len() >= self.capacity {
            match self.overflow {
                OverflowPolicy::DropOldest => {
                    dropped = inner.pop_front_n(1);
                    warn!(capacity = self.capacity, "queue full, evicted oldest event");
                }
                OverflowPolicy::DropNewest => {
                    warn!(
                        capacity = self.capacity,
                        event_type = %record.event_type(),
                        "queue full, rejecting event"
                    );
                    return EnqueueOutcome {
                        accepted: false,
                        dropped: 1,
                        len: inner.records.len(),
                    };
                }
            }
        }

        inner.records.push_back(record);
        inner.revision += 1;
        EnqueueOutcome {
            accepted: true,
            dropped,
            len: inner.records.len(),
        }
    }

    /// Copy of the current contents, in order.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.inner.lock().records.iter().cloned().collect()
    }

    /// Freeze the current contents as a flush batch.
    pub(crate) fn snapshot_batch(&self) -> Batch {
        let inner = self.inner.lock();
        Batch {
            first_seq: inner.head_seq,
            events: inner.records.iter().cloned().collect(),
        }
    }

    /// Remove exactly the first `n` records (fewer if the queue is shorter).
    pub(crate) fn remove_prefix(&self, n: usize) -> usize {
        self.inner.lock().pop_front_n(n)
    }

    /// Remove the records of a delivered batch that are still queued.
    pub(crate) fn acknowledge(&self, batch: &Batch) -> usize {
        let mut inner = self.inner.lock();
        let end = batch.first_seq + batch.events.len() as u64;
        let remaining = usize::try_from(end.saturating_sub(inner.head_seq)).unwrap_or(usize::MAX);
        inner.pop_front_n(remaining)
    }

    /// Drop every pending record.
    pub(crate) fn clear(&self) -> usize {
        self.remove_prefix(usize::MAX)
    }

    /// Write the full current image to storage.
    ///
    /// Writes are serialized and each one captures the queue at the moment
    /// it starts, so the last completed write always reflects the latest
    /// state. A write is skipped when nothing changed since the last success.
    pub async fn persist(&self) -> Result<(), TelemetryError> {
        let _guard = self.write_lock.lock().await;

        let (revision, image) = {
            let inner = self.inner.lock();
            if inner.revision == inner.persisted_revision {
                return Ok(());
            }
            (inner.revision, serde_json::to_value(&inner.records)?)
        };

        self.store.put(keys::PENDING_EVENTS, image).await?;

        let mut inner = self.inner.lock();
        inner.persisted_revision = inner.persisted_revision.max(revision);
        Ok(())
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Maximum pending records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Read-only view of a [`DurableQueue`] for consumers such as reports.
#[derive(Clone)]
pub struct QueueReader {
    queue: Arc<DurableQueue>,
}

impl QueueReader {
    pub(crate) fn new(queue: Arc<DurableQueue>) -> Self {
        Self { queue }
    }

    /// Copy of the pending records, in order.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.queue.snapshot()
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
