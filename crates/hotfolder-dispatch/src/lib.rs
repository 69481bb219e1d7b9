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

//! Dispatch engine core: decide per file which rules apply, copy it to their
//! destinations and remove the original once every copy landed.
//!
//! Layout: `model.rs` (`Rule`, `FileTask`), `rules.rs` (`RuleSet`), `matcher.rs`
//! (`RuleMatcher` strategy), `stability.rs` (size-settle detector), `executor.rs`
//! (`TransferExecutor` pipeline), `queue.rs` (bounded `DispatchQueue`), `error.rs`.

pub mod error;
pub mod executor;
pub mod matcher;
pub mod model;
pub mod queue;
pub mod rules;
pub mod stability;

pub use error::{DispatchError, DispatchResult};
pub use executor::{DispatchOutcome, TransferExecutor};
pub use matcher::{RuleMatcher, SourceMembershipMatcher};
pub use model::{FileTask, Rule};
pub use queue::DispatchQueue;
pub use rules::RuleSet;
pub use stability::{StabilityPolicy, wait_until_stable};
