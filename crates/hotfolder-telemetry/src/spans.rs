//! Span constructors shared by the dispatch workers.

use std::fmt::Display;
use std::path::Path;

use tracing::{Span, info_span};

/// Span wrapping one dispatch attempt for a file.
#[must_use]
pub fn dispatch_span(attempt_id: impl Display, path: &Path) -> Span {
    info_span!(
        "dispatch",
        attempt_id = %attempt_id,
        path = %path.display(),
        build = crate::init::build_sha()
    )
}
