use std::fs;
use std::sync::Arc;
use std::time::Duration;

use hotfolder_config::{HotfolderConfig, validate_config};
use hotfolder_dispatch::{
    DispatchOutcome, DispatchQueue, FileTask, RuleSet, StabilityPolicy, TransferExecutor,
};
use hotfolder_events::{Event, EventBus};
use hotfolder_telemetry::Metrics;
use hotfolder_test_support::DropTree;
use tokio::time::timeout;

type TestResult<T> = anyhow::Result<T>;

fn executor_for(yaml: &str) -> TestResult<(TransferExecutor, EventBus, Metrics)> {
    let config = validate_config(&HotfolderConfig::from_yaml_str(yaml)?)?;
    let events = EventBus::with_capacity(64);
    let metrics = Metrics::new()?;
    let executor = TransferExecutor::new(
        Arc::new(RuleSet::from_config(&config)?),
        events.clone(),
        metrics.clone(),
    )
    .with_stability(StabilityPolicy::from_config(&config));
    Ok((executor, events, metrics))
}

#[test]
fn csv_lands_in_both_destinations_and_leaves_the_source() -> TestResult<()> {
    let tree = DropTree::with_dirs(&["in1"], &["out1", "out2"])?;
    let yaml = tree
        .config()
        .format("tables", &[".csv"])
        .rule("R1", &["tables"], &["in1"], &["out1", "out2"])
        .render();
    let (executor, _, _) = executor_for(&yaml)?;

    let source = fs::canonicalize(tree.source("in1")?)?.join("data.csv");
    fs::write(&source, b"id,value\n1,42\n")?;
    let outcome = executor.execute(&FileTask::new(&source)?);

    assert!(matches!(outcome, DispatchOutcome::Dispatched { copies: 2, .. }));
    for dest in ["out1", "out2"] {
        assert_eq!(
            fs::read(tree.destination(dest)?.join("data.csv"))?,
            b"id,value\n1,42\n"
        );
    }
    assert!(!source.exists());
    Ok(())
}

#[test]
fn text_file_without_a_rule_stays_put() -> TestResult<()> {
    let tree = DropTree::with_dirs(&["in1"], &["out1"])?;
    let yaml = tree
        .config()
        .format("tables", &["csv"])
        .rule("R1", &["tables"], &["in1"], &["out1"])
        .render();
    let (executor, events, _) = executor_for(&yaml)?;

    let source = fs::canonicalize(tree.source("in1")?)?.join("notes.txt");
    fs::write(&source, b"remember")?;
    let outcome = executor.execute(&FileTask::new(&source)?);

    assert!(matches!(outcome, DispatchOutcome::Skipped { .. }));
    assert_eq!(fs::read(&source)?, b"remember");
    assert_eq!(fs::read_dir(tree.destination("out1")?)?.count(), 0);
    let skipped = events
        .backlog_since(0)
        .into_iter()
        .any(|envelope| matches!(envelope.event, Event::DispatchSkipped { .. }));
    assert!(skipped);
    Ok(())
}

#[tokio::test]
async fn json_matching_two_rules_reaches_the_union_through_the_queue() -> TestResult<()> {
    let tree = DropTree::with_dirs(&["in1"], &["out1", "out2", "out3"])?;
    let yaml = tree
        .config()
        .format("events", &["json"])
        .rule("audit", &["events"], &["in1"], &["out1"])
        .rule("stream", &["events"], &["in1"], &["out2", "out3"])
        .render();
    let (executor, _, metrics) = executor_for(&yaml)?;
    let queue = DispatchQueue::new(Arc::new(executor), 2, metrics.clone())?;

    let source = fs::canonicalize(tree.source("in1")?)?.join("event.json");
    fs::write(&source, br#"{"ok":true}"#)?;
    queue.submit(FileTask::new(&source)?)?;
    timeout(Duration::from_secs(10), queue.shutdown()).await?;

    for dest in ["out1", "out2", "out3"] {
        assert!(tree.destination(dest)?.join("event.json").is_file());
    }
    assert!(!source.exists());
    assert_eq!(metrics.snapshot().copies_total, 3);
    Ok(())
}
