use std::time::Duration;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Error taxonomy for the telemetry pipeline.
///
/// Producers never see these: `track` swallows failures and logs them.
/// They surface on the delivery path, on storage access, and from the
/// explicit operations (`flush_now`, `clear`, export).
#[derive(Clone, Debug, thiserror::Error)]
pub enum TelemetryError {
    // Producer input
    #[error("cannot build event: {0}")]
    Build(String),

    // Local durability
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("serialization failed: {0}")]
    Serialization(String),

    // Delivery (the batch stays queued)
    #[error("network error: {0}")]
    Network(String),
    #[error("server rejected batch {status}: {body}")]
    Server { status: u16, body: String },
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // Operational
    #[error("pipeline is shut down")]
    Closed,
}

impl TelemetryError {
    /// Whether the failure is transient. Delivery failures always keep the
    /// batch queued; this only decides how loudly the failure is logged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Server { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure happened while delivering a batch.
    pub fn is_delivery(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. } | Self::Timeout(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Build(_) => "build",
            Self::Persistence(_) => "persistence",
            Self::Serialization(_) => "serialization",
            Self::Network(_) => "network",
            Self::Server { .. } => "server",
            Self::Timeout(_) => "timeout",
            Self::Closed => "closed",
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        Self::Server { status, body }
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(TelemetryError::Network("refused".into()).is_retryable());
        assert!(TelemetryError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(TelemetryError::from_status(503, "down".into()).is_retryable());
        assert!(TelemetryError::from_status(429, "slow".into()).is_retryable());
        assert!(!TelemetryError::from_status(400, "bad".into()).is_retryable());
        assert!(!TelemetryError::from_status(401, "key".into()).is_retryable());
        assert!(!TelemetryError::Persistence("disk".into()).is_retryable());
    }

    #[test]
    fn delivery_classification() {
        assert!(TelemetryError::from_status(400, String::new()).is_delivery());
        assert!(TelemetryError::Network("x".into()).is_delivery());
        assert!(!TelemetryError::Build("x".into()).is_delivery());
        assert!(!TelemetryError::Closed.is_delivery());
    }

    #[test]
    fn error_kinds() {
        assert_eq!(TelemetryError::Network("x".into()).error_kind(), "network");
        assert_eq!(TelemetryError::from_status(500, String::new()).error_kind(), "server");
        assert_eq!(TelemetryError::Timeout(Duration::ZERO).error_kind(), "timeout");
        assert_eq!(TelemetryError::Closed.error_kind(), "closed");
    }

    #[test]
    fn display_includes_status() {
        let err = TelemetryError::from_status(502, "bad gateway".into());
        assert_eq!(err.to_string(), "server rejected batch 502: bad gateway");
    }

    #[test]
    fn serde_json_error_converts() {
        let err: TelemetryError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_matches!(err, TelemetryError::Serialization(_));
        assert_eq!(err.error_kind(), "serialization");
    }

    #[test]
    fn from_status_keeps_body() {
        assert_matches!(
            TelemetryError::from_status(413, "too large".into()),
            TelemetryError::Server { status: 413, ref body } if body == "too large"
        );
    }
}
