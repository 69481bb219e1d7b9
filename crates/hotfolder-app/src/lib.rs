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
#![allow(clippy::module_name_repetitions)]

//! Hotfolder application wiring: filesystem observers, the shared event
//! handler and the engine lifecycle around the dispatch core.
//!
//! Layout: `bootstrap.rs` (CLI and process bootstrap), `engine.rs` (composition
//! root and stop sequence), `observer.rs` (per-source watcher tasks),
//! `handler.rs` (notification filter), `error.rs`.

pub mod bootstrap;
pub mod engine;
pub mod error;
pub mod handler;
pub mod observer;

pub use bootstrap::{Cli, LogFormatArg, load_validated, run_app};
pub use engine::{Engine, EngineDeps};
pub use error::{AppError, AppResult};
pub use handler::{FileEventHandler, Handled, Trigger};
pub use observer::{DirectoryObserver, ObserverState};
