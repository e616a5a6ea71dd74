//! The JSON export document.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use leia_core::EventRecord;
use leia_core::event::iso_millis;
use serde::Serialize;
use tracing::info;

use crate::errors::{ReportError, Result};
use crate::summary::{Summary, summarize};

/// Everything pending plus its summary, as written to disk.
#[derive(Clone, Debug, Serialize)]
pub struct ExportDocument {
    /// When the export was taken.
    #[serde(with = "iso_millis")]
    pub export_date: DateTime<Utc>,
    /// Version of the producing extension.
    pub extension_version: String,
    /// Pending records in queue order.
    pub events: Vec<EventRecord>,
    /// Aggregates over `events`.
    pub summary: Summary,
}

/// Assemble an export of `events`. An empty snapshot is [`ReportError::NoData`].
pub fn build_export(events: Vec<EventRecord>, extension_version: &str, now: DateTime<Utc>) -> Result<ExportDocument> {
    if events.is_empty() {
        return Err(ReportError::NoData);
    }
    let summary = summarize(&events, now);
    Ok(ExportDocument {
        export_date: now,
        extension_version: extension_version.to_string(),
        events,
        summary,
    })
}

/// Write `document` to `path` as pretty JSON, creating parent directories.
pub fn write_export(document: &ExportDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let body = serde_json::to_string_pretty(document)?;
    fs::write(path, body)?;
    info!(path = %path.display(), events = document.events.len(), "analytics export written");
    Ok(())
}
