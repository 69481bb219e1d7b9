#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Telemetry primitives shared across the hotfolder workspace.
//!
//! This crate centralises logging setup, span helpers and Prometheus metrics so
//! the dispatch core and the engine report through one consistent surface.
//!
//! Layout: `init.rs` (subscriber installation and file sink), `spans.rs`
//! (span constructors), `metrics.rs` (registry and snapshot), `error.rs`.

pub mod error;
pub mod init;
pub mod metrics;
pub mod spans;

pub use error::{TelemetryError, TelemetryResult};
pub use init::{LogFormat, LoggingConfig, LoggingGuard, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
pub use spans::dispatch_span;
