//! # Design
//!
//! - Provide structured, constant-message errors for the dispatch pipeline.
//! - Capture operation context (paths, fields, inputs) to make failures reproducible in tests.
//! - Keep the "source vanished" case distinct so callers can treat it as routine.

use std::error::Error as _;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors produced by the dispatch core.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// IO failures while interacting with the filesystem.
    #[error("dispatch io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The source file disappeared before the pipeline finished with it.
    #[error("dispatch source file no longer exists")]
    SourceMissing {
        /// Operation that noticed the file was gone.
        operation: &'static str,
        /// Source path.
        path: PathBuf,
    },
    /// The file kept changing size for longer than the stability timeout.
    #[error("file did not settle before the stability timeout")]
    StabilityTimeout {
        /// File being sampled.
        path: PathBuf,
        /// Time spent waiting.
        waited: Duration,
        /// Last observed size in bytes.
        last_size: u64,
    },
    /// Input validation failures.
    #[error("dispatch invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// A rule referenced a table entry missing from the validated configuration.
    #[error("dispatch rule reference unresolved")]
    UnresolvedReference {
        /// Rule carrying the reference.
        rule: String,
        /// Referenced table.
        kind: &'static str,
        /// Name that failed to resolve.
        name: String,
    },
    /// The queue stopped accepting work.
    #[error("dispatch queue is closed")]
    QueueClosed {
        /// Path that was rejected.
        path: PathBuf,
    },
    /// The queue was constructed outside a Tokio runtime.
    #[error("dispatch queue requires a tokio runtime")]
    RuntimeUnavailable,
}

impl DispatchError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether the failure only means the file vanished (moved or deleted externally).
    #[must_use]
    pub const fn is_missing_source(&self) -> bool {
        matches!(self, Self::SourceMissing { .. })
    }

    /// Render the error and its sources as `outer: inner: ...`, enriched with
    /// the operation and path when present.
    #[must_use]
    pub fn chain(&self) -> String {
        let mut rendered = match self {
            Self::Io {
                operation, path, ..
            }
            | Self::SourceMissing { operation, path } => {
                format!("{self} ({operation} {})", path.display())
            }
            Self::StabilityTimeout {
                path,
                waited,
                last_size,
            } => format!(
                "{self} ({} after {waited:?}, last size {last_size})",
                path.display()
            ),
            Self::InvalidInput { field, reason, .. } => format!("{self} ({field}: {reason})"),
            Self::UnresolvedReference { rule, kind, name } => {
                format!("{self} (rule {rule} {kind} {name})")
            }
            Self::QueueClosed { path } => format!("{self} ({})", path.display()),
            Self::RuntimeUnavailable => self.to_string(),
        };
        let mut current = self.source();
        while let Some(source) = current {
            rendered.push_str(": ");
            rendered.push_str(&source.to_string());
            current = source.source();
        }
        rendered
    }
}
