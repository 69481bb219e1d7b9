//! Composition root and lifecycle of the dispatcher.
//!
//! # Design
//! - Dependencies (event bus, metrics, logging guard) are injected, never global.
//! - `run` is the blocking observe phase and returns once the stop sequence ran.
//! - The stop sequence runs exactly once, whoever triggers it: cancel observers,
//!   join each, drain the queue, then release the logging guard.
//! - Ctrl-C is a normal stop request; a fatal watcher error also stops the engine
//!   and is returned from `run`, whichever caller ran the stop sequence. There is
//!   no automatic restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hotfolder_config::ValidatedConfig;
use hotfolder_dispatch::{DispatchQueue, RuleSet, StabilityPolicy, TransferExecutor};
use hotfolder_events::{Event, EventBus};
use hotfolder_telemetry::{LoggingGuard, Metrics};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{AppError, AppResult};
use crate::handler::FileEventHandler;
use crate::observer::{DirectoryObserver, ObserverState};

/// Externally owned collaborators handed to [`Engine::new`].
pub struct EngineDeps {
    events: EventBus,
    metrics: Metrics,
    logging: Option<LoggingGuard>,
    handle_signals: bool,
}

impl EngineDeps {
    /// Dependencies with no logging guard that stop on Ctrl-C.
    #[must_use]
    pub const fn new(events: EventBus, metrics: Metrics) -> Self {
        Self {
            events,
            metrics,
            logging: None,
            handle_signals: true,
        }
    }

    /// Hand the logging guard to the engine; it is dropped last on stop.
    #[must_use]
    pub fn with_logging(mut self, guard: LoggingGuard) -> Self {
        self.logging = Some(guard);
        self
    }

    /// Whether `run` listens for Ctrl-C.
    #[must_use]
    pub const fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

type ObserverHandles = Vec<(String, JoinHandle<AppResult<()>>)>;

/// Owns the observers, the queue and the lifecycle.
pub struct Engine {
    rules: Arc<RuleSet>,
    queue: Arc<DispatchQueue>,
    handler: Arc<FileEventHandler>,
    observers: Vec<DirectoryObserver>,
    events: EventBus,
    cancel: CancellationToken,
    stop_requested: AtomicBool,
    handle_signals: bool,
    phase: Mutex<Phase>,
    running: tokio::sync::Mutex<Option<ObserverHandles>>,
    logging: Mutex<Option<LoggingGuard>>,
    fatal: Mutex<Option<AppError>>,
}

impl Engine {
    /// Wire rules, executor, queue, handler and one observer per source.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Dispatch`] when the rule table cannot be built or no
    /// runtime is available for the queue.
    pub fn new(config: ValidatedConfig, deps: EngineDeps) -> AppResult<Self> {
        let EngineDeps {
            events,
            metrics,
            logging,
            handle_signals,
        } = deps;

        let rules = Arc::new(
            RuleSet::from_config(&config).map_err(|err| AppError::dispatch("engine.rules", err))?,
        );
        let executor = TransferExecutor::new(Arc::clone(&rules), events.clone(), metrics.clone())
            .with_stability(StabilityPolicy::from_config(&config));
        let queue = Arc::new(
            DispatchQueue::new(Arc::new(executor), config.threads(), metrics.clone())
                .map_err(|err| AppError::dispatch("engine.queue", err))?,
        );
        let handler = Arc::new(FileEventHandler::new(
            Arc::clone(&queue),
            events.clone(),
            metrics,
        ));
        let observers = config
            .sources()
            .iter()
            .map(|(name, path)| {
                DirectoryObserver::new(
                    name.clone(),
                    path.clone(),
                    config.backend(),
                    config.sources_timeout(),
                )
            })
            .collect();

        Ok(Self {
            rules,
            queue,
            handler,
            observers,
            events,
            cancel: CancellationToken::new(),
            stop_requested: AtomicBool::new(false),
            handle_signals,
            phase: Mutex::new(Phase::Idle),
            running: tokio::sync::Mutex::new(None),
            logging: Mutex::new(logging),
            fatal: Mutex::new(None),
        })
    }

    /// Rules the engine dispatches against.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Observer states in source-name order.
    #[must_use]
    pub fn observer_states(&self) -> Vec<(String, ObserverState)> {
        self.observers
            .iter()
            .map(|observer| (observer.name().to_string(), observer.state()))
            .collect()
    }

    /// Whether the stop sequence completed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.lock_phase() == Phase::Stopped
    }

    /// Start every observer and block until the engine is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AlreadyStarted`] on a second call, and the watcher
    /// error that forced the stop when observation failed.
    pub async fn run(&self) -> AppResult<()> {
        if let Err(err) = self.start_observers().await {
            error!(error = %err.chain(), "failed to start observers");
            if !matches!(err, AppError::AlreadyStarted) {
                self.stop_sequence("fatal").await;
                let _ = self.take_fatal();
            }
            return Err(err);
        }
        info!(
            sources = self.observers.len(),
            threads = self.queue.threads(),
            rules = self.rules.len(),
            "hotfolder engine started"
        );
        self.publish_event(Event::EngineStarted {
            sources: self.observers.len(),
            threads: self.queue.threads(),
        });

        let cause = tokio::select! {
            () = self.cancel.cancelled() => {
                if self.stop_requested.load(Ordering::SeqCst) { "request" } else { "fatal" }
            }
            () = interrupt(self.handle_signals) => "signal",
        };
        self.stop_sequence(cause).await;
        match self.take_fatal() {
            Some(err) => {
                error!(error = %err.chain(), "engine stopped after a fatal error");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Request a stop and wait for the stop sequence to finish.
    ///
    /// A second call returns once the first stop completed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotStarted`] when `run` was never called.
    pub async fn stop(&self) -> AppResult<()> {
        if *self.lock_phase() == Phase::Idle {
            return Err(AppError::NotStarted);
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.stop_sequence("request").await;
        Ok(())
    }

    async fn start_observers(&self) -> AppResult<()> {
        let mut running = self.running.lock().await;
        {
            let mut phase = self.lock_phase();
            if *phase != Phase::Idle {
                return Err(AppError::AlreadyStarted);
            }
            *phase = Phase::Running;
        }
        let handles = running.insert(Vec::with_capacity(self.observers.len()));
        for observer in &self.observers {
            let handle = observer.start(Arc::clone(&self.handler), self.cancel.clone())?;
            handles.push((observer.name().to_string(), handle));
        }
        drop(running);
        Ok(())
    }

    async fn stop_sequence(&self, cause: &'static str) {
        let mut running = self.running.lock().await;
        let Some(handles) = running.take() else {
            return;
        };

        info!(cause, "hotfolder engine stopping");
        self.publish_event(Event::EngineStopping {
            cause: cause.to_string(),
        });
        self.cancel.cancel();

        let mut fatal = None;
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(())) => debug!(source = %name, "observer joined"),
                Ok(Err(err)) => {
                    error!(source = %name, error = %err.chain(), "observer ended with an error");
                    if fatal.is_none() {
                        fatal = Some(err);
                    }
                }
                Err(err) => error!(source = %name, error = %err, "observer task panicked"),
            }
        }

        debug!(in_flight = self.queue.in_flight(), "draining dispatch queue");
        self.queue.shutdown().await;
        *self.lock_phase() = Phase::Stopped;

        info!("hotfolder engine stopped");
        self.publish_event(Event::EngineStopped);
        let guard = self
            .logging
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(guard) = guard {
            trace!(log_file = ?guard.log_file(), "releasing log file sink");
            drop(guard);
        }
        if let Some(err) = fatal {
            *self.fatal.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        }
        // Concurrent callers wait on this lock until the whole sequence ran.
        drop(running);
    }

    fn take_fatal(&self) -> Option<AppError> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn publish_event(&self, event: Event) {
        let kind = event.kind();
        let id = self.events.publish(event);
        trace!(event_id = id, event_kind = kind, "event published");
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn interrupt(enabled: bool) {
    if enabled {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received");
                return;
            }
            Err(err) => warn!(error = %err, "failed to listen for interrupts"),
        }
    }
    std::future::pending::<()>().await;
}
