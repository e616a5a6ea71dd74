//! # leia-core
//!
//! Foundation types shared by every crate of the Leia telemetry pipeline.
//!
//! - **Session IDs**: [`SessionId`] correlation identifiers (`session_<millis>_<rand>`)
//! - **Event model**: [`EventType`], [`Identity`], [`PlatformInfo`], [`EventRecord`]
//! - **Errors**: [`TelemetryError`] taxonomy via `thiserror`
//! - **Backoff**: [`BackoffPolicy`] capped exponential retry delays
//! - **Query classification**: [`classify_query`] for chat interaction events

#![deny(unsafe_code)]

pub mod errors;
pub mod event;
pub mod ids;
pub mod query;
pub mod retry;

pub use errors::{Result, TelemetryError};
pub use event::{EventRecord, EventType, Identity, PlatformInfo, ANONYMOUS};
pub use ids::SessionId;
pub use query::{classify_query, QueryCategory};
pub use retry::BackoffPolicy;
