//! Error types for configuration loading and validation.
//!
//! # Design
//! - Every variant names the offending section or field so startup failures are actionable.
//! - IO failures carry the operation identifier and path.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File system operation failed.
    #[error("filesystem operation '{operation}' failed for '{}'", path.display())]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The configuration path exists but is not a regular file.
    #[error("configuration path '{}' is not a regular file", path.display())]
    NotAFile {
        /// Offending path.
        path: PathBuf,
    },
    /// The YAML document did not match the configuration schema.
    #[error("configuration document could not be parsed")]
    Parse {
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// The YAML file did not match the configuration schema.
    #[error("configuration file '{}' could not be parsed", path.display())]
    ParseFile {
        /// File being parsed.
        path: PathBuf,
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// Field contained an invalid value.
    #[error("invalid value for '{field}' in '{section}': {reason}")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Field that failed validation.
        field: String,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A rule referenced a format group, source or destination that does not exist.
    #[error("rule '{rule}' references unknown {kind} '{name}'")]
    UnknownReference {
        /// Rule carrying the reference.
        rule: String,
        /// Referenced table (`format`, `source` or `destination`).
        kind: &'static str,
        /// Name that failed to resolve.
        name: String,
    },
    /// A configured directory failed an existence or permission check.
    #[error("{kind} '{name}' at '{}' {reason}", path.display())]
    UnusableDirectory {
        /// Directory table (`source` or `destination`).
        kind: &'static str,
        /// Configured name.
        name: String,
        /// Configured path.
        path: PathBuf,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A source and a destination resolve to the same directory.
    #[error("source '{source_name}' and destination '{destination_name}' both resolve to '{}'", path.display())]
    SourceIsDestination {
        /// Source name.
        source_name: String,
        /// Destination name.
        destination_name: String,
        /// Canonical path shared by both.
        path: PathBuf,
    },
}

impl ConfigError {
    /// Build an IO error with operation context.
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_field(
        section: &'static str,
        field: impl Into<String>,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field: field.into(),
            value,
            reason,
        }
    }

    pub(crate) fn unusable(
        kind: &'static str,
        name: &str,
        path: impl Into<PathBuf>,
        reason: &'static str,
    ) -> Self {
        Self::UnusableDirectory {
            kind,
            name: name.to_string(),
            path: path.into(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn config_error_messages_name_the_field() {
        let err = ConfigError::invalid_field("general", "threads", Some("0".into()), "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid value for 'threads' in 'general': must be at least 1"
        );

        let err = ConfigError::UnknownReference {
            rule: "R1".into(),
            kind: "source",
            name: "in9".into(),
        };
        assert_eq!(err.to_string(), "rule 'R1' references unknown source 'in9'");
    }

    #[test]
    fn io_error_preserves_source() {
        let err = ConfigError::io("load.read", "/etc/hotfolder.yaml", io::Error::other("denied"));
        assert!(err.to_string().contains("load.read"));
        assert!(err.source().is_some());
    }
}
