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

//! Shared test helpers used across unit and integration suites.
//! Layout: fixtures.rs (temp drop trees and config documents), assert.rs (async polling assertions).

pub mod assert;
pub mod fixtures;

pub use assert::wait_until;
pub use fixtures::{ConfigYaml, DropTree};
