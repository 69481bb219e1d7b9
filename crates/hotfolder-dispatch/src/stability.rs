//! Size-settle detector for files still being written.
//!
//! # Design
//! - Two consecutive equal size samples mean the writer is done; there is no checksum.
//! - The first sample is compared against "no sample yet", so at least two real
//!   samples are always taken.
//! - Blocking: the calling worker sleeps between samples and stays occupied.
//! - `timeout: None` keeps the unbounded wait; a bounded wait fails with
//!   [`DispatchError::StabilityTimeout`].

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use hotfolder_config::ValidatedConfig;
use tracing::trace;

use crate::error::{DispatchError, DispatchResult};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Sampling cadence and upper bound for [`wait_until_stable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    /// Delay between two size samples.
    pub poll_interval: Duration,
    /// Give up after this long; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl StabilityPolicy {
    /// Policy configured under `dispatcher.stability`.
    #[must_use]
    pub const fn from_config(config: &ValidatedConfig) -> Self {
        Self {
            poll_interval: config.stability_poll_interval(),
            timeout: config.stability_timeout(),
        }
    }
}

/// Block until the size of `path` stops changing and return the settled size.
///
/// # Errors
///
/// Returns [`DispatchError::SourceMissing`] if the file disappears while being
/// sampled, [`DispatchError::Io`] for other metadata failures and
/// [`DispatchError::StabilityTimeout`] once the policy's timeout elapses.
pub fn wait_until_stable(path: &Path, policy: &StabilityPolicy) -> DispatchResult<u64> {
    let started = Instant::now();
    let mut previous: Option<u64> = None;
    loop {
        let size = sample_size(path)?;
        if previous == Some(size) {
            trace!(path = %path.display(), size, "file settled");
            return Ok(size);
        }
        previous = Some(size);

        let waited = started.elapsed();
        if let Some(limit) = policy.timeout
            && waited >= limit
        {
            return Err(DispatchError::StabilityTimeout {
                path: path.to_path_buf(),
                waited,
                last_size: size,
            });
        }
        thread::sleep(policy.poll_interval);
    }
}

fn sample_size(path: &Path) -> DispatchResult<u64> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(DispatchError::SourceMissing {
            operation: "stability.sample",
            path: path.to_path_buf(),
        }),
        Err(err) => Err(DispatchError::io("stability.sample", path, err)),
    }
}
