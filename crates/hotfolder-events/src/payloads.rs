//! Event payload types emitted by the dispatch pipeline and engine.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier assigned to each event published on the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Why a file was observed but not dispatched.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The path was a directory, a special file or a dangling entry.
    NotRegularFile,
    /// The file name carried no extension so no rule can ever match it.
    NoExtension,
    /// No configured rule accepted the file.
    NoMatchingRule,
}

impl SkipReason {
    /// Stable label used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotRegularFile => "not_regular_file",
            Self::NoExtension => "no_extension",
            Self::NoMatchingRule => "no_matching_rule",
        }
    }
}

/// Typed events surfaced across the workspace.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A create or move-to notification arrived for a path.
    FileObserved {
        /// Absolute path reported by the watcher.
        path: String,
        /// Notification flavour (`created` or `moved`).
        trigger: String,
    },
    /// The event handler dropped a path before submitting it.
    FileSkipped {
        /// Absolute path reported by the watcher.
        path: String,
        /// Reason the path was dropped.
        reason: SkipReason,
    },
    /// A worker picked up a file and entered the pipeline.
    DispatchStarted {
        /// Identifier of this dispatch attempt.
        attempt_id: Uuid,
        /// Absolute path of the source file.
        path: String,
    },
    /// The file was copied to every matching destination and removed.
    DispatchSucceeded {
        /// Identifier of this dispatch attempt.
        attempt_id: Uuid,
        /// Absolute path of the source file.
        path: String,
        /// Names of the rules that matched.
        rules: Vec<String>,
        /// Number of destination copies written.
        copies: usize,
    },
    /// The pipeline completed without touching the file.
    DispatchSkipped {
        /// Identifier of this dispatch attempt.
        attempt_id: Uuid,
        /// Absolute path of the source file.
        path: String,
        /// Reason nothing was copied.
        reason: SkipReason,
    },
    /// The pipeline failed; the source file was left in place.
    DispatchFailed {
        /// Identifier of this dispatch attempt.
        attempt_id: Uuid,
        /// Absolute path of the source file.
        path: String,
        /// Rendered error chain.
        message: String,
    },
    /// Observers were started for every configured source.
    EngineStarted {
        /// Number of source directories being watched.
        sources: usize,
        /// Worker pool size.
        threads: usize,
    },
    /// A stop was requested and the shutdown sequence began.
    EngineStopping {
        /// What triggered the stop (`request`, `signal` or `fatal`).
        cause: String,
    },
    /// Observers joined and the dispatch queue drained.
    EngineStopped,
}

impl Event {
    /// Machine-friendly discriminator for log and stream consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FileObserved { .. } => "file_observed",
            Self::FileSkipped { .. } => "file_skipped",
            Self::DispatchStarted { .. } => "dispatch_started",
            Self::DispatchSucceeded { .. } => "dispatch_succeeded",
            Self::DispatchSkipped { .. } => "dispatch_skipped",
            Self::DispatchFailed { .. } => "dispatch_failed",
            Self::EngineStarted { .. } => "engine_started",
            Self::EngineStopping { .. } => "engine_stopping",
            Self::EngineStopped => "engine_stopped",
        }
    }

    /// Path carried by file and dispatch events.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::FileObserved { path, .. }
            | Self::FileSkipped { path, .. }
            | Self::DispatchStarted { path, .. }
            | Self::DispatchSucceeded { path, .. }
            | Self::DispatchSkipped { path, .. }
            | Self::DispatchFailed { path, .. } => Some(path),
            Self::EngineStarted { .. } | Self::EngineStopping { .. } | Self::EngineStopped => None,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned by the bus.
    pub id: EventId,
    /// Wall-clock time the event was published.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult<T> = anyhow::Result<T>;

    #[test]
    fn event_kinds_are_snake_case_tags() -> TestResult<()> {
        let event = Event::DispatchSkipped {
            attempt_id: Uuid::nil(),
            path: "/in/a.txt".into(),
            reason: SkipReason::NoMatchingRule,
        };
        assert_eq!(event.kind(), "dispatch_skipped");

        let json = serde_json::to_value(&event)?;
        assert_eq!(json["type"], "dispatch_skipped");
        assert_eq!(json["reason"], "no_matching_rule");
        Ok(())
    }

    #[test]
    fn skip_reason_labels_match_serde_names() -> TestResult<()> {
        for reason in [
            SkipReason::NotRegularFile,
            SkipReason::NoExtension,
            SkipReason::NoMatchingRule,
        ] {
            let json = serde_json::to_value(reason)?;
            assert_eq!(json, reason.as_str());
        }
        Ok(())
    }

    #[test]
    fn engine_events_carry_no_path() {
        assert_eq!(Event::EngineStopped.path(), None);
        let observed = Event::FileObserved {
            path: "/in/data.csv".into(),
            trigger: "created".into(),
        };
        assert_eq!(observed.path(), Some("/in/data.csv"));
    }
}
