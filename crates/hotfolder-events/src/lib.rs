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

//! Typed dispatch events and the in-process event bus.
//!
//! The bus assigns sequential identifiers and keeps a bounded replay ring so
//! late subscribers (tests, health probes) can catch up on recent activity.
//!
//! Layout: `payloads.rs` (event enum and envelope), `routing.rs` (`EventBus`).

pub mod payloads;
pub mod routing;

pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId, SkipReason};
pub use routing::{EventBus, EventStream};
