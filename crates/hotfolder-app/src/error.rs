//! # Design
//!
//! - Centralize application-level errors for bootstrap, observation and lifecycle.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::error::Error as _;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: hotfolder_config::ConfigError,
    },
    /// Dispatch core construction failed.
    #[error("dispatch operation failed")]
    Dispatch {
        /// Operation identifier.
        operation: &'static str,
        /// Source dispatch error.
        source: hotfolder_dispatch::DispatchError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: hotfolder_telemetry::TelemetryError,
    },
    /// A filesystem watcher could not be set up or failed while observing.
    #[error("filesystem watcher failed")]
    Watch {
        /// Operation identifier.
        operation: &'static str,
        /// Watched directory.
        path: PathBuf,
        /// Source notification error.
        source: notify::Error,
    },
    /// `stop` was called before `run`.
    #[error("engine has not been started")]
    NotStarted,
    /// `run` was called on an engine that already ran.
    #[error("engine was already started")]
    AlreadyStarted,
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: hotfolder_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn dispatch(
        operation: &'static str,
        source: hotfolder_dispatch::DispatchError,
    ) -> Self {
        Self::Dispatch { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: hotfolder_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) fn watch(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: notify::Error,
    ) -> Self {
        Self::Watch {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Process exit status: `2` for configuration failures, `1` otherwise.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } => 2,
            _ => 1,
        }
    }

    /// Render the error and its sources as `outer (operation): inner: ...`.
    #[must_use]
    pub fn chain(&self) -> String {
        let mut rendered = match self {
            Self::Config { operation, .. }
            | Self::Dispatch { operation, .. }
            | Self::Telemetry { operation, .. } => format!("{self} ({operation})"),
            Self::Watch {
                operation, path, ..
            } => format!("{self} ({operation} {})", path.display()),
            Self::NotStarted | Self::AlreadyStarted => self.to_string(),
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
