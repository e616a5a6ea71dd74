use std::path::PathBuf;

use leia_core::TelemetryError;

/// Failures of the key/value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite rejected a statement or could not open the file.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A value could not be encoded, or a stored value is not JSON.
    #[error("value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The database directory could not be created.
    #[error("cannot create {}: {source}", path.display())]
    CreateDir {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },

    /// The store refused the write (see [`crate::MemoryStore::set_fail_writes`]).
    #[error("write rejected")]
    Rejected,

    /// The blocking worker running the statement panicked or was cancelled.
    #[error("store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<StoreError> for TelemetryError {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e.to_string())
    }
}
