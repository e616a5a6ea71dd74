//! Report error types.

use thiserror::Error;

/// Errors surfaced by the administrative export path.
#[derive(Debug, Error)]
pub enum ReportError {
    /// There are no pending events to export.
    #[error("no telemetry data to export")]
    NoData,
    /// Writing the export file failed.
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
    /// Encoding the export document failed.
    #[error("failed to encode export: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_message() {
        assert_eq!(ReportError::NoData.to_string(), "no telemetry data to export");
    }

    #[test]
    fn io_error_from_conversion() {
        let err: ReportError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
