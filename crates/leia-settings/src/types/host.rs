//! Where data lives, how logs are written, and what the host reports about itself.

use serde::{Deserialize, Serialize};

/// Durable storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Key/value database path (relative to `~/.leia`).
    pub db_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "telemetry.db".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Persist warn+ events to the diagnostics database.
    pub persist_diagnostics: bool,
    /// Diagnostics database path (relative to `~/.leia`).
    pub db_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            persist_diagnostics: true,
            db_path: "diagnostics.db".to_string(),
        }
    }
}

/// Versions stamped into each record's platform metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSettings {
    /// Host application version.
    pub host_version: String,
    /// Extension version.
    pub extension_version: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            host_version: env!("CARGO_PKG_VERSION").to_string(),
            extension_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
