//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the dispatch pipeline reports on.
//! - Each `Metrics` owns its registry, so tests can build isolated instances.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

const OUTCOME_LABELS: [&str; 3] = ["dispatched", "skipped", "failed"];
const SKIP_REASON_LABELS: [&str; 3] = ["not_regular_file", "no_extension", "no_matching_rule"];

/// Prometheus-backed metrics registry shared across the engine.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    files_observed_total: IntCounter,
    files_skipped_total: IntCounterVec,
    dispatch_total: IntCounterVec,
    copies_total: IntCounter,
    dispatch_in_flight: IntGauge,
    dispatch_queued: IntGauge,
}

/// Snapshot of counters and gauges for health reporting.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Create and move-to notifications accepted by the handler.
    pub files_observed_total: u64,
    /// Paths dropped before or during dispatch, summed over the known reasons.
    pub files_skipped_total: u64,
    /// Attempts that copied and removed the source.
    pub dispatched_total: u64,
    /// Attempts that matched no rule.
    pub skipped_total: u64,
    /// Attempts that failed and left the source in place.
    pub failed_total: u64,
    /// Destination copies written.
    pub copies_total: u64,
    /// Attempts currently holding a worker slot.
    pub dispatch_in_flight: i64,
    /// Attempts waiting for a worker slot.
    pub dispatch_queued: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let files_observed_total = register(
            &registry,
            "files_observed_total",
            IntCounter::with_opts(Opts::new(
                "files_observed_total",
                "Filesystem notifications accepted by the event handler",
            )),
        )?;
        let files_skipped_total = register(
            &registry,
            "files_skipped_total",
            IntCounterVec::new(
                Opts::new(
                    "files_skipped_total",
                    "Paths dropped by the event handler by reason",
                ),
                &["reason"],
            ),
        )?;
        let dispatch_total = register(
            &registry,
            "dispatch_total",
            IntCounterVec::new(
                Opts::new("dispatch_total", "Dispatch attempts by outcome"),
                &["outcome"],
            ),
        )?;
        let copies_total = register(
            &registry,
            "copies_total",
            IntCounter::with_opts(Opts::new(
                "copies_total",
                "Destination copies written by the transfer executor",
            )),
        )?;
        let dispatch_in_flight = register(
            &registry,
            "dispatch_in_flight",
            IntGauge::with_opts(Opts::new(
                "dispatch_in_flight",
                "Dispatch attempts holding a worker slot",
            )),
        )?;
        let dispatch_queued = register(
            &registry,
            "dispatch_queued",
            IntGauge::with_opts(Opts::new(
                "dispatch_queued",
                "Dispatch attempts waiting for a worker slot",
            )),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                files_observed_total,
                files_skipped_total,
                dispatch_total,
                copies_total,
                dispatch_in_flight,
                dispatch_queued,
            }),
        })
    }

    /// Count a notification accepted by the event handler.
    pub fn inc_file_observed(&self) {
        self.inner.files_observed_total.inc();
    }

    /// Count a path dropped by the event handler.
    pub fn inc_file_skipped(&self, reason: &str) {
        self.inner
            .files_skipped_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Count a finished dispatch attempt (`dispatched`, `skipped` or `failed`).
    pub fn inc_dispatch(&self, outcome: &str) {
        self.inner
            .dispatch_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Add written destination copies.
    pub fn add_copies(&self, copies: u64) {
        self.inner.copies_total.inc_by(copies);
    }

    /// A queued attempt acquired a worker slot.
    pub fn worker_started(&self) {
        self.inner.dispatch_queued.dec();
        self.inner.dispatch_in_flight.inc();
    }

    /// A running attempt released its worker slot.
    pub fn worker_finished(&self) {
        self.inner.dispatch_in_flight.dec();
    }

    /// An attempt was submitted and waits for a slot.
    pub fn attempt_queued(&self) {
        self.inner.dispatch_queued.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of counters and gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        let skipped_total = SKIP_REASON_LABELS
            .iter()
            .copied()
            .map(|label| inner.files_skipped_total.with_label_values(&[label]).get())
            .sum();
        let [dispatched, skipped, failed] =
            OUTCOME_LABELS.map(|label| inner.dispatch_total.with_label_values(&[label]).get());
        MetricsSnapshot {
            files_observed_total: inner.files_observed_total.get(),
            files_skipped_total: skipped_total,
            dispatched_total: dispatched,
            skipped_total: skipped,
            failed_total: failed,
            copies_total: inner.copies_total.get(),
            dispatch_in_flight: inner.dispatch_in_flight.get(),
            dispatch_queued: inner.dispatch_queued.get(),
        }
    }
}

fn register<C>(
    registry: &Registry,
    name: &'static str,
    collector: prometheus::Result<C>,
) -> TelemetryResult<C>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    let collector = collector.map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(collector)
}
