//! Why settings could not be produced.

use std::path::PathBuf;

use thiserror::Error;

/// Loading or validation failure.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was opened.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },
    /// The settings file is not JSON, or does not fit the settings shape.
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying failure.
        source: serde_json::Error,
    },
    /// The compiled defaults could not be turned into JSON for merging.
    #[error("cannot encode default settings: {0}")]
    Defaults(#[source] serde_json::Error),
    /// A value the pipeline cannot run with.
    #[error("{field}: {reason}")]
    Invalid {
        /// camelCase path of the offending key, e.g. `telemetry.flushThreshold`.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn invalid_names_the_field() {
        let err = SettingsError::Invalid {
            field: "telemetry.flushThreshold",
            reason: "must be at least 1",
        };
        assert_eq!(err.to_string(), "telemetry.flushThreshold: must be at least 1");
    }

    #[test]
    fn file_errors_mention_the_path_and_keep_the_source() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/leia/settings.json"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("cannot read /etc/leia/settings.json"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
