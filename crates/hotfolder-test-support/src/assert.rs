//! Async polling assertions for filesystem-driven tests.

use std::time::Duration;

use anyhow::{Result, bail};
use tokio::time::{Instant, sleep};

const POLL_STEP: Duration = Duration::from_millis(20);

/// Poll `condition` until it holds or `timeout` elapses.
///
/// # Errors
///
/// Returns an error naming `what` when the timeout elapses first.
pub async fn wait_until<F>(what: &str, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("timed out after {timeout:?} waiting for {what}");
        }
        sleep(POLL_STEP).await;
    }
}
