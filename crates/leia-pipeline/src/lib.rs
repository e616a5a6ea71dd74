//! # leia-pipeline
//!
//! Offline-first, at-least-once delivery of usage events to a single
//! ingestion endpoint.
//!
//! Producers call [`Tracker`]; records are built by [`RecordBuilder`],
//! appended to the [`DurableQueue`], persisted in the background, and
//! delivered in batches by the [`SyncEngine`]. [`Pipeline`] wires the pieces
//! together and owns their tasks.
//!
//! Only the sync engine removes records from the queue, and it runs at most
//! one flush at a time. Producers and readers can append or read, nothing else.

#![deny(unsafe_code)]

pub mod builder;
pub mod engine;
mod persister;
pub mod queue;
pub mod service;
pub mod session;
pub mod testing;
pub mod tracker;

pub use builder::{IdentityContext, RecordBuilder};
pub use engine::{
    BatchTransport, EngineState, FlushOutcome, HttpTransport, StatsSnapshot, SyncEngine, SyncHandle,
    Trigger,
};
pub use leia_settings::OverflowPolicy;
pub use queue::{Batch, DurableQueue, EnqueueOutcome, QueueReader};
pub use service::{Pipeline, PipelineConfig};
pub use session::{Session, SessionCorrelator};
pub use tracker::Tracker;
