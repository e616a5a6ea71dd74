//! # leia-logging
//!
//! `tracing` subscriber for binaries that host the telemetry pipeline.
//!
//! Human-readable or JSON lines go to stderr, filtered by `RUST_LOG` when set
//! and by the configured directive otherwise. Warnings and errors can also be
//! kept in a SQLite table (see [`DiagnosticsSink`]) and inspected after a run.

#![deny(unsafe_code)]

mod diagnostics;

pub use diagnostics::{DiagnosticRecord, DiagnosticsLayer, DiagnosticsQuery, DiagnosticsSink};

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// What [`init_logging`] installs.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `leia_pipeline=debug`.
    pub level: String,
    /// JSON lines instead of text.
    pub json: bool,
    /// Keep WARN and ERROR events in SQLite.
    pub persist_diagnostics: bool,
    /// Diagnostics database location.
    pub db_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            persist_diagnostics: false,
            db_path: PathBuf::from("diagnostics.db"),
        }
    }
}

/// Returned by [`init_logging`].
pub struct LoggingGuard {
    diagnostics: Option<Arc<DiagnosticsSink>>,
}

impl LoggingGuard {
    /// The diagnostics table, when persistence is on and the database opened.
    pub fn diagnostics(&self) -> Option<&DiagnosticsSink> {
        self.diagnostics.as_deref()
    }
}

fn filter_for(directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn console_layer(config: &LoggingConfig) -> BoxedLayer {
    let base = fmt::layer().with_writer(std::io::stderr).with_target(true);
    let layer: BoxedLayer = if config.json { base.json().boxed() } else { base.boxed() };
    layer.with_filter(filter_for(&config.level)).boxed()
}

fn open_sink(config: &LoggingConfig) -> Option<Arc<DiagnosticsSink>> {
    if !config.persist_diagnostics {
        return None;
    }
    // The subscriber is not installed yet, so report on stderr directly.
    DiagnosticsSink::open(&config.db_path)
        .map_err(|e| eprintln!("leia-logging: diagnostics disabled, cannot open {}: {e}", config.db_path.display()))
        .ok()
        .map(Arc::new)
}

/// Install the global subscriber. Only the first call in a process takes
/// effect; the returned guard still exposes the sink opened by this call.
pub fn init_logging(config: &LoggingConfig) -> LoggingGuard {
    let sink = open_sink(config);
    let persisted = sink.clone().map(DiagnosticsLayer::new);

    let installed = tracing_subscriber::registry()
        .with(console_layer(config))
        .with(persisted)
        .try_init();
    if let Err(e) = installed {
        eprintln!("leia-logging: keeping existing subscriber: {e}");
    }

    LoggingGuard { diagnostics: sink }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_sink_unless_persistence_requested() {
        let guard = init_logging(&LoggingConfig::default());
        assert!(guard.diagnostics().is_none());
    }

    #[test]
    fn persistence_opens_database_under_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            persist_diagnostics: true,
            db_path: dir.path().join("logs").join("diagnostics.db"),
            ..LoggingConfig::default()
        };
        let guard = init_logging(&config);
        assert!(guard.diagnostics().is_some());
        assert!(config.db_path.exists());
    }
}
