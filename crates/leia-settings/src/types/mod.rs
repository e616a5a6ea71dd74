//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the fields it changes.

mod host;
mod telemetry;

pub use host::*;
pub use telemetry::*;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "telemetry": { "endpoint": "https://analytics.example.edu/api/analytics", "flushThreshold": 20 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeiaSettings {
    /// Delivery pipeline settings.
    pub telemetry: TelemetrySettings,
    /// Durable storage settings.
    pub storage: StorageSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Host platform metadata.
    pub host: HostSettings,
}

impl LeiaSettings {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.telemetry;
        let checks = [
            (t.endpoint.trim().is_empty(), "telemetry.endpoint", "must not be blank"),
            (t.sync_interval_ms == 0, "telemetry.syncIntervalMs", "must be at least 1"),
            (t.flush_threshold == 0, "telemetry.flushThreshold", "must be at least 1"),
            (t.max_queue_len == 0, "telemetry.maxQueueLen", "must be at least 1"),
            (t.request_timeout_ms == 0, "telemetry.requestTimeoutMs", "must be at least 1"),
            (
                !(0.0..=1.0).contains(&t.backoff.jitter_factor),
                "telemetry.backoff.jitterFactor",
                "must be within 0.0..=1.0",
            ),
        ];
        match checks.into_iter().find(|(failed, ..)| *failed) {
            Some((_, field, reason)) => Err(SettingsError::Invalid { field, reason }),
            None => Ok(()),
        }
    }

    /// Resolve a configured path: absolute paths are kept, relative ones live under `home`.
    pub fn resolve_path(home: &Path, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            home.join(path)
        }
    }
}
