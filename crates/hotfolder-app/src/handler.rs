//! Shared filter stage between the observers and the dispatch queue.
//!
//! # Design
//! - One handler instance serves every observer; it holds no mutable state.
//! - Paths that are not regular files, or carry no extension, never reach the queue.
//! - Symlinks to regular files are followed and accepted.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use hotfolder_dispatch::{DispatchQueue, FileTask};
use hotfolder_events::{Event, EventBus, SkipReason};
use hotfolder_telemetry::Metrics;
use tracing::{debug, trace};

/// Kind of notification that surfaced a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A new entry appeared in the directory.
    Created,
    /// An entry was moved or renamed into the directory.
    Moved,
}

impl Trigger {
    /// Stable label for logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Moved => "moved",
        }
    }
}

/// What the handler did with a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// A task was queued for dispatch.
    Submitted,
    /// The path was dropped before the queue.
    Skipped(SkipReason),
    /// The queue no longer accepts work.
    Rejected,
}

/// Filters notifications and submits qualifying files.
pub struct FileEventHandler {
    queue: Arc<DispatchQueue>,
    events: EventBus,
    metrics: Metrics,
}

impl FileEventHandler {
    /// Handler feeding `queue`.
    #[must_use]
    pub const fn new(queue: Arc<DispatchQueue>, events: EventBus, metrics: Metrics) -> Self {
        Self {
            queue,
            events,
            metrics,
        }
    }

    /// Apply the filter to `path` and submit it when it qualifies.
    pub fn handle(&self, trigger: Trigger, path: &Path) -> Handled {
        self.metrics.inc_file_observed();
        let shown = path.display().to_string();
        self.publish_event(Event::FileObserved {
            path: shown.clone(),
            trigger: trigger.as_str().to_string(),
        });

        if !fs::metadata(path).is_ok_and(|metadata| metadata.is_file()) {
            return self.skip(shown, SkipReason::NotRegularFile);
        }
        let Ok(task) = FileTask::new(path) else {
            return self.skip(shown, SkipReason::NoExtension);
        };

        match self.queue.submit(task) {
            Ok(()) => Handled::Submitted,
            Err(err) => {
                debug!(path = %shown, error = %err.chain(), "dispatch queue rejected file");
                Handled::Rejected
            }
        }
    }

    fn skip(&self, path: String, reason: SkipReason) -> Handled {
        debug!(path = %path, reason = reason.as_str(), "file dropped before dispatch");
        self.metrics.inc_file_skipped(reason.as_str());
        self.publish_event(Event::FileSkipped { path, reason });
        Handled::Skipped(reason)
    }

    fn publish_event(&self, event: Event) {
        let kind = event.kind();
        let id = self.events.publish(event);
        trace!(event_id = id, event_kind = kind, "event published");
    }
}
