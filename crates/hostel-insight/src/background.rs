//! Detached side tasks and bounded adapter calls.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Runs `task` detached. Its failure is logged and never reaches a caller.
pub fn spawn_non_critical<F>(name: &'static str, task: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match task.await {
            Ok(()) => debug!("Background task '{}' finished", name),
            Err(e) => warn!("Background task '{}' failed: {:#}", name, e),
        }
    })
}

/// Calls `op` with a per-attempt timeout, retrying once on error or timeout.
pub async fn with_timeout_and_retry<T, F, Fut>(
    name: &str,
    timeout: Duration,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut last_error = None;
    for attempt in 1..=2 {
        match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                debug!("{} attempt {} failed: {:#}", name, attempt, e);
                last_error = Some(e);
            }
            Err(_) => {
                debug!("{} attempt {} timed out after {:?}", name, attempt, timeout);
                last_error = Some(anyhow::anyhow!("{} timed out after {:?}", name, timeout));
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("{} failed", name)))
}
