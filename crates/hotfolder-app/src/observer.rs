//! Per-directory watchers feeding the shared event handler.
//!
//! # Design
//! - One observer per source directory, non-recursive.
//! - State machine: `Idle -> Observing -> Stopping -> Stopped`.
//! - Notifications flow from the `notify` callback into a channel drained by a
//!   Tokio task; the task also watches the shared cancellation token and wakes at
//!   least once per poll timeout.
//! - Only create events and rename-to events are forwarded. inotify reports a
//!   rename both as `To` and as `Both`; only the `To` half is forwarded so one
//!   move yields one submission.
//! - Watch-level failures (directory gone, watch limit) are fatal and cancel the
//!   token so the engine runs its stop sequence; other notification errors are
//!   logged and observation continues.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hotfolder_config::WatchBackend;
use notify::event::{ModifyKind, RenameMode};
use notify::{
    Config as NotifyConfig, ErrorKind, Event as NotifyEvent, EventKind, PollWatcher,
    RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{AppError, AppResult};
use crate::handler::{FileEventHandler, Trigger};

/// Lifecycle of one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    /// Constructed, not watching yet.
    Idle,
    /// Watching and forwarding notifications.
    Observing,
    /// Stop requested; the watch is being removed.
    Stopping,
    /// The watch is gone and the task finished.
    Stopped,
}

impl ObserverState {
    /// Stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Observing => "observing",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

type WatchResult = notify::Result<NotifyEvent>;

/// Watches one source directory.
#[derive(Debug)]
pub struct DirectoryObserver {
    name: String,
    path: PathBuf,
    backend: WatchBackend,
    poll_timeout: Duration,
    state: Arc<Mutex<ObserverState>>,
}

impl DirectoryObserver {
    /// Observer for the source `name` at `path`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        backend: WatchBackend,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            backend,
            poll_timeout,
            state: Arc::new(Mutex::new(ObserverState::Idle)),
        }
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ObserverState {
        *lock_state(&self.state)
    }

    /// Install the watch and spawn the forwarding task.
    ///
    /// The task ends once `cancel` fires or a fatal watch error occurs; the
    /// latter also cancels `cancel`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AlreadyStarted`] if the observer left `Idle`, and
    /// [`AppError::Watch`] when the watcher cannot be created or attached.
    pub fn start(
        &self,
        handler: Arc<FileEventHandler>,
        cancel: CancellationToken,
    ) -> AppResult<JoinHandle<AppResult<()>>> {
        {
            let mut state = lock_state(&self.state);
            if *state != ObserverState::Idle {
                return Err(AppError::AlreadyStarted);
            }
            *state = ObserverState::Observing;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = match self.attach(tx) {
            Ok(watcher) => watcher,
            Err(err) => {
                *lock_state(&self.state) = ObserverState::Stopped;
                return Err(err);
            }
        };
        info!(
            source = %self.name,
            path = %self.path.display(),
            backend = self.backend.as_str(),
            "observing source directory"
        );

        let task = ObserverTask {
            name: self.name.clone(),
            path: self.path.clone(),
            poll_timeout: self.poll_timeout,
            state: Arc::clone(&self.state),
            watcher,
            rx,
            handler,
            cancel,
        };
        Ok(tokio::spawn(task.run()))
    }

    fn attach(&self, tx: mpsc::UnboundedSender<WatchResult>) -> AppResult<Box<dyn Watcher + Send>> {
        let forward = move |result: WatchResult| {
            let _ = tx.send(result);
        };
        let mut watcher: Box<dyn Watcher + Send> = match self.backend {
            WatchBackend::Native => Box::new(
                RecommendedWatcher::new(forward, NotifyConfig::default())
                    .map_err(|err| AppError::watch("observer.create", &self.path, err))?,
            ),
            WatchBackend::Poll => Box::new(
                PollWatcher::new(
                    forward,
                    NotifyConfig::default().with_poll_interval(self.poll_timeout),
                )
                .map_err(|err| AppError::watch("observer.create", &self.path, err))?,
            ),
        };
        watcher
            .watch(&self.path, RecursiveMode::NonRecursive)
            .map_err(|err| AppError::watch("observer.watch", &self.path, err))?;
        Ok(watcher)
    }
}

struct ObserverTask {
    name: String,
    path: PathBuf,
    poll_timeout: Duration,
    state: Arc<Mutex<ObserverState>>,
    watcher: Box<dyn Watcher + Send>,
    rx: mpsc::UnboundedReceiver<WatchResult>,
    handler: Arc<FileEventHandler>,
    cancel: CancellationToken,
}

impl ObserverTask {
    async fn run(mut self) -> AppResult<()> {
        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => break Ok(()),
                received = self.rx.recv() => match received {
                    Some(Ok(event)) => forward(&self.name, &self.handler, &event),
                    Some(Err(err)) if is_fatal(&err) => {
                        error!(source = %self.name, error = %err, "watcher failed");
                        self.cancel.cancel();
                        break Err(AppError::watch("observer.event", &self.path, err));
                    }
                    Some(Err(err)) => {
                        warn!(source = %self.name, error = %err, "watcher reported an error");
                    }
                    None => break Ok(()),
                },
                () = tokio::time::sleep(self.poll_timeout) => {
                    trace!(source = %self.name, "observer idle");
                }
            }
        };

        *lock_state(&self.state) = ObserverState::Stopping;
        if let Err(err) = self.watcher.unwatch(&self.path) {
            debug!(source = %self.name, error = %err, "unwatch failed");
        }
        drop(self.watcher);
        *lock_state(&self.state) = ObserverState::Stopped;
        debug!(source = %self.name, "observer stopped");
        result
    }
}

fn forward(source: &str, handler: &FileEventHandler, event: &NotifyEvent) {
    let Some(trigger) = trigger_for(&event.kind) else {
        trace!(source, kind = ?event.kind, "notification ignored");
        return;
    };
    for path in candidate_paths(event) {
        let handled = handler.handle(trigger, path);
        trace!(source, path = %path.display(), outcome = ?handled, "notification handled");
    }
}

fn trigger_for(kind: &EventKind) -> Option<Trigger> {
    match kind {
        EventKind::Create(_) => Some(Trigger::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            Some(Trigger::Moved)
        }
        _ => None,
    }
}

fn candidate_paths(event: &NotifyEvent) -> Vec<&Path> {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => event
            .paths
            .iter()
            .map(PathBuf::as_path)
            .filter(|path| path.exists())
            .collect(),
        _ => event.paths.iter().map(PathBuf::as_path).collect(),
    }
}

fn is_fatal(err: &notify::Error) -> bool {
    matches!(
        err.kind,
        ErrorKind::PathNotFound
            | ErrorKind::WatchNotFound
            | ErrorKind::MaxFilesWatch
            | ErrorKind::InvalidConfig(_)
    )
}

fn lock_state(state: &Mutex<ObserverState>) -> MutexGuard<'_, ObserverState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
