//! Per-file dispatch pipeline.
//!
//! # Design
//! - Stage order is fixed: prepare (stability wait), dispatch (match and copy),
//!   remove source, report.
//! - Every failure is caught at the executor boundary and reported; nothing
//!   propagates to the queue.
//! - The source is removed only after the dispatch stage finished without error,
//!   so a partial multi-destination copy leaves the original in place.
//! - A destination reached through several matching rules is written once.
//! - Re-running the pipeline on a file that was copied but not removed overwrites
//!   the earlier copies.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotfolder_events::{Event, EventBus, SkipReason};
use hotfolder_telemetry::{Metrics, dispatch_span};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{DispatchError, DispatchResult};
use crate::matcher::{RuleMatcher, SourceMembershipMatcher};
use crate::model::FileTask;
use crate::rules::RuleSet;
use crate::stability::{StabilityPolicy, wait_until_stable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageKind {
    Prepare,
    Dispatch,
    RemoveSource,
}

impl StageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Dispatch => "dispatch",
            Self::RemoveSource => "remove_source",
        }
    }
}

#[derive(Debug)]
struct StageFailure {
    stage: StageKind,
    error: DispatchError,
}

/// Result of one pipeline run.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The file was copied to every matching destination and removed.
    Dispatched {
        /// Names of the matching rules, in rule order.
        rules: Vec<String>,
        /// Distinct destination copies written.
        copies: usize,
    },
    /// Nothing was copied and the file was left untouched.
    Skipped {
        /// Why nothing was copied.
        reason: SkipReason,
    },
    /// A stage failed; the source is still in place.
    Failed {
        /// Stage that failed.
        stage: &'static str,
        /// Underlying failure.
        error: DispatchError,
    },
}

impl DispatchOutcome {
    /// Stable label used for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatched { .. } => "dispatched",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

struct Matched {
    rules: Vec<String>,
    copies: usize,
}

/// Runs the dispatch pipeline for one file at a time; cheap to share across workers.
pub struct TransferExecutor {
    rules: Arc<RuleSet>,
    matcher: Arc<dyn RuleMatcher>,
    stability: StabilityPolicy,
    events: EventBus,
    metrics: Metrics,
}

impl TransferExecutor {
    /// Executor using [`SourceMembershipMatcher`] and the default stability policy.
    #[must_use]
    pub fn new(rules: Arc<RuleSet>, events: EventBus, metrics: Metrics) -> Self {
        Self {
            rules,
            matcher: Arc::new(SourceMembershipMatcher),
            stability: StabilityPolicy::default(),
            events,
            metrics,
        }
    }

    /// Replace the rule matching strategy.
    #[must_use]
    pub fn with_matcher(mut self, matcher: Arc<dyn RuleMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Replace the stability policy.
    #[must_use]
    pub const fn with_stability(mut self, stability: StabilityPolicy) -> Self {
        self.stability = stability;
        self
    }

    /// Run the pipeline for `task`. Blocks for the stability wait and the copies.
    pub fn execute(&self, task: &FileTask) -> DispatchOutcome {
        let attempt_id = Uuid::new_v4();
        let span = dispatch_span(attempt_id, task.path());
        let _entered = span.enter();

        info!("dispatch started");
        self.publish_event(Event::DispatchStarted {
            attempt_id,
            path: task.path().display().to_string(),
        });

        let outcome = match self.execute_pipeline(task) {
            Ok(Some(matched)) => DispatchOutcome::Dispatched {
                rules: matched.rules,
                copies: matched.copies,
            },
            Ok(None) => DispatchOutcome::Skipped {
                reason: SkipReason::NoMatchingRule,
            },
            Err(failure) => DispatchOutcome::Failed {
                stage: failure.stage.as_str(),
                error: failure.error,
            },
        };
        self.report(attempt_id, task, &outcome);
        outcome
    }

    fn execute_pipeline(&self, task: &FileTask) -> Result<Option<Matched>, StageFailure> {
        Self::execute_step(StageKind::Prepare, || self.run_prepare(task))?;
        let matched = Self::execute_step(StageKind::Dispatch, || self.run_dispatch(task))?;
        if matched.copies == 0 {
            return Ok(None);
        }
        Self::execute_step(StageKind::RemoveSource, || Self::run_remove_source(task))?;
        Ok(Some(matched))
    }

    fn execute_step<T, F>(stage: StageKind, op: F) -> Result<T, StageFailure>
    where
        F: FnOnce() -> DispatchResult<T>,
    {
        trace!(stage = stage.as_str(), "stage started");
        match op() {
            Ok(value) => {
                trace!(stage = stage.as_str(), "stage completed");
                Ok(value)
            }
            Err(error) => Err(StageFailure { stage, error }),
        }
    }

    fn run_prepare(&self, task: &FileTask) -> DispatchResult<()> {
        let size = wait_until_stable(task.path(), &self.stability)?;
        debug!(size, "file is stable");
        Ok(())
    }

    fn run_dispatch(&self, task: &FileTask) -> DispatchResult<Matched> {
        let mut rules = Vec::new();
        let mut written: BTreeSet<&Path> = BTreeSet::new();
        for rule in self.rules.iter() {
            if !self.matcher.matches(task, rule) {
                continue;
            }
            rules.push(rule.name().to_string());
            for destination in rule.destinations() {
                if !written.insert(destination.as_path()) {
                    continue;
                }
                let target = copy_into(task, destination)?;
                debug!(
                    rule = %rule.name(),
                    target = %target.display(),
                    "copied to destination"
                );
            }
        }
        Ok(Matched {
            rules,
            copies: written.len(),
        })
    }

    fn run_remove_source(task: &FileTask) -> DispatchResult<()> {
        fs::remove_file(task.path()).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                DispatchError::SourceMissing {
                    operation: "dispatch.remove_source",
                    path: task.path().to_path_buf(),
                }
            } else {
                DispatchError::io("dispatch.remove_source", task.path(), err)
            }
        })
    }

    fn report(&self, attempt_id: Uuid, task: &FileTask, outcome: &DispatchOutcome) {
        self.metrics.inc_dispatch(outcome.as_str());
        let path = task.path().display().to_string();
        match outcome {
            DispatchOutcome::Dispatched { rules, copies } => {
                self.metrics
                    .add_copies(u64::try_from(*copies).unwrap_or(u64::MAX));
                info!(rules = ?rules, copies, "dispatch succeeded");
                self.publish_event(Event::DispatchSucceeded {
                    attempt_id,
                    path,
                    rules: rules.clone(),
                    copies: *copies,
                });
            }
            DispatchOutcome::Skipped { reason } => {
                self.metrics.inc_file_skipped(reason.as_str());
                debug!(reason = reason.as_str(), "dispatch skipped");
                self.publish_event(Event::DispatchSkipped {
                    attempt_id,
                    path,
                    reason: *reason,
                });
            }
            DispatchOutcome::Failed { stage, error } => {
                let message = error.chain();
                if error.is_missing_source() {
                    info!(stage, error = %message, "source vanished before dispatch finished");
                } else {
                    warn!(stage, error = %message, "dispatch failed");
                }
                self.publish_event(Event::DispatchFailed {
                    attempt_id,
                    path,
                    message,
                });
            }
        }
    }

    fn publish_event(&self, event: Event) {
        let kind = event.kind();
        let id = self.events.publish(event);
        trace!(event_id = id, event_kind = kind, "event published");
    }
}

fn copy_into(task: &FileTask, destination: &Path) -> DispatchResult<PathBuf> {
    let target = destination.join(task.file_name());
    match fs::symlink_metadata(&target) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            fs::remove_file(&target)
                .map_err(|err| DispatchError::io("dispatch.unlink_target", &target, err))?;
        }
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(DispatchError::io("dispatch.inspect_target", &target, err)),
    }
    fs::copy(task.path(), &target).map_err(|err| {
        if err.kind() == ErrorKind::NotFound && !task.path().exists() {
            DispatchError::SourceMissing {
                operation: "dispatch.copy",
                path: task.path().to_path_buf(),
            }
        } else {
            DispatchError::io("dispatch.copy", &target, err)
        }
    })?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rule;
    use std::time::Duration;

    type TestResult<T> = anyhow::Result<T>;

    struct Fixture {
        temp: tempfile::TempDir,
        events: EventBus,
        metrics: Metrics,
    }

    impl Fixture {
        fn new(dirs: &[&str]) -> TestResult<Self> {
            let temp = tempfile::tempdir()?;
            for dir in dirs {
                fs::create_dir(temp.path().join(dir))?;
            }
            Ok(Self {
                temp,
                events: EventBus::with_capacity(32),
                metrics: Metrics::new()?,
            })
        }

        fn dir(&self, name: &str) -> PathBuf {
            self.temp.path().join(name)
        }

        fn rule(&self, name: &str, formats: &[&str], destinations: &[&str]) -> TestResult<Rule> {
            Ok(Rule::new(
                name,
                formats.iter().copied(),
                [self.dir("in1")],
                destinations.iter().map(|dest| self.dir(dest)),
            )?)
        }

        fn executor(&self, rules: Vec<Rule>) -> TransferExecutor {
            TransferExecutor::new(
                Arc::new(RuleSet::new(rules)),
                self.events.clone(),
                self.metrics.clone(),
            )
            .with_stability(StabilityPolicy {
                poll_interval: Duration::from_millis(5),
                timeout: Some(Duration::from_secs(2)),
            })
        }

        fn drop_file(&self, name: &str, contents: &[u8]) -> TestResult<FileTask> {
            let path = self.dir("in1").join(name);
            fs::write(&path, contents)?;
            Ok(FileTask::new(path)?)
        }
    }

    #[test]
    fn matching_file_is_copied_then_removed() -> TestResult<()> {
        let fx = Fixture::new(&["in1", "out1", "out2"])?;
        let executor = fx.executor(vec![fx.rule("R1", &["csv"], &["out1", "out2"])?]);
        let task = fx.drop_file("data.csv", b"a,b\n1,2\n")?;

        let outcome = executor.execute(&task);
        assert!(matches!(outcome, DispatchOutcome::Dispatched { copies: 2, .. }));
        assert_eq!(fs::read(fx.dir("out1").join("data.csv"))?, b"a,b\n1,2\n");
        assert_eq!(fs::read(fx.dir("out2").join("data.csv"))?, b"a,b\n1,2\n");
        assert!(!task.path().exists());

        let snapshot = fx.metrics.snapshot();
        assert_eq!(snapshot.dispatched_total, 1);
        assert_eq!(snapshot.copies_total, 2);
        Ok(())
    }

    #[test]
    fn unmatched_file_is_left_untouched() -> TestResult<()> {
        let fx = Fixture::new(&["in1", "out1"])?;
        let executor = fx.executor(vec![fx.rule("R1", &["csv"], &["out1"])?]);
        let task = fx.drop_file("notes.txt", b"hello")?;

        let outcome = executor.execute(&task);
        assert!(matches!(
            outcome,
            DispatchOutcome::Skipped {
                reason: SkipReason::NoMatchingRule
            }
        ));
        assert_eq!(fs::read(task.path())?, b"hello");
        assert_eq!(fs::read_dir(fx.dir("out1"))?.count(), 0);
        assert_eq!(fx.metrics.snapshot().skipped_total, 1);
        Ok(())
    }

    #[test]
    fn overlapping_rules_copy_to_the_union_once() -> TestResult<()> {
        let fx = Fixture::new(&["in1", "out1", "out2", "out3"])?;
        let executor = fx.executor(vec![
            fx.rule("A", &["json"], &["out1", "out2"])?,
            fx.rule("B", &["json"], &["out2", "out3"])?,
        ]);
        let task = fx.drop_file("event.json", b"{}")?;

        match executor.execute(&task) {
            DispatchOutcome::Dispatched { rules, copies } => {
                assert_eq!(rules, ["A", "B"]);
                assert_eq!(copies, 3);
            }
            other => anyhow::bail!("unexpected outcome: {other:?}"),
        }
        for dest in ["out1", "out2", "out3"] {
            assert!(fx.dir(dest).join("event.json").is_file(), "{dest} missing copy");
        }
        assert!(!task.path().exists());
        Ok(())
    }

    #[test]
    fn partial_copy_failure_keeps_the_source() -> TestResult<()> {
        let fx = Fixture::new(&["in1", "out1", "out2"])?;
        fs::create_dir(fx.dir("out2").join("data.csv"))?;
        let executor = fx.executor(vec![fx.rule("R1", &["csv"], &["out1", "out2"])?]);
        let task = fx.drop_file("data.csv", b"a,b")?;

        let outcome = executor.execute(&task);
        assert!(matches!(
            outcome,
            DispatchOutcome::Failed {
                stage: "dispatch",
                error: DispatchError::Io {
                    operation: "dispatch.copy",
                    ..
                }
            }
        ));
        assert_eq!(fs::read(fx.dir("out1").join("data.csv"))?, b"a,b");
        assert_eq!(fs::read(task.path())?, b"a,b");
        assert_eq!(fx.metrics.snapshot().failed_total, 1);
        Ok(())
    }

    #[test]
    fn rerun_after_partial_failure_is_safe() -> TestResult<()> {
        let fx = Fixture::new(&["in1", "out1", "out2"])?;
        let blocker = fx.dir("out2").join("data.csv");
        fs::create_dir(&blocker)?;
        let executor = fx.executor(vec![fx.rule("R1", &["csv"], &["out1", "out2"])?]);
        let task = fx.drop_file("data.csv", b"a,b")?;
        assert!(matches!(executor.execute(&task), DispatchOutcome::Failed { .. }));

        fs::remove_dir(&blocker)?;
        assert!(matches!(
            executor.execute(&task),
            DispatchOutcome::Dispatched { copies: 2, .. }
        ));
        assert_eq!(fs::read(fx.dir("out1").join("data.csv"))?, b"a,b");
        assert_eq!(fs::read(&blocker)?, b"a,b");
        assert!(!task.path().exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn destination_symlinks_are_replaced_not_followed() -> TestResult<()> {
        let fx = Fixture::new(&["in1", "out1", "elsewhere"])?;
        let victim = fx.dir("elsewhere").join("victim.csv");
        fs::write(&victim, b"keep me")?;
        std::os::unix::fs::symlink(&victim, fx.dir("out1").join("data.csv"))?;
        let executor = fx.executor(vec![fx.rule("R1", &["csv"], &["out1"])?]);
        let task = fx.drop_file("data.csv", b"new")?;

        assert!(matches!(executor.execute(&task), DispatchOutcome::Dispatched { .. }));
        let target = fx.dir("out1").join("data.csv");
        assert!(!fs::symlink_metadata(&target)?.file_type().is_symlink());
        assert_eq!(fs::read(&target)?, b"new");
        assert_eq!(fs::read(&victim)?, b"keep me");
        Ok(())
    }

    #[test]
    fn vanished_file_fails_in_prepare() -> TestResult<()> {
        let fx = Fixture::new(&["in1", "out1"])?;
        let executor = fx.executor(vec![fx.rule("R1", &["csv"], &["out1"])?]);
        let task = FileTask::new(fx.dir("in1").join("ghost.csv"))?;

        match executor.execute(&task) {
            DispatchOutcome::Failed { stage, error } => {
                assert_eq!(stage, "prepare");
                assert!(error.is_missing_source());
            }
            other => anyhow::bail!("unexpected outcome: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn outcome_events_follow_the_started_event() -> TestResult<()> {
        let fx = Fixture::new(&["in1", "out1"])?;
        let executor = fx.executor(vec![fx.rule("R1", &["csv"], &["out1"])?]);
        let task = fx.drop_file("data.csv", b"x")?;
        let _ = executor.execute(&task);

        let kinds: Vec<_> = fx
            .events
            .backlog_since(0)
            .into_iter()
            .map(|envelope| envelope.event.kind())
            .collect();
        assert_eq!(kinds, ["dispatch_started", "dispatch_succeeded"]);
        Ok(())
    }
}
