//! # leia-report
//!
//! Read-side views over pending telemetry events.
//!
//! - [`summarize`]: pure aggregation over a snapshot of records
//! - [`build_export`] / [`write_export`]: the JSON export document
//! - [`render_markdown`]: human-readable summary

#![deny(unsafe_code)]

pub mod errors;
pub mod export;
pub mod markdown;
pub mod summary;

pub use errors::{ReportError, Result};
pub use export::{ExportDocument, build_export, write_export};
pub use markdown::render_markdown;
pub use summary::{CategoryCounts, Summary, SummaryStats, TypeCount, summarize};
