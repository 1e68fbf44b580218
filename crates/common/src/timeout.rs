use std::{future::Future, time::Duration};

use tracing::warn;

/// Returned when a bounded operation exceeds its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{operation} timed out after {elapsed:?}")]
pub struct TimedOut {
    pub operation: &'static str,
    pub elapsed: Duration,
}

/// Run `fut` with an optional deadline.
///
/// `None` means unbounded. The future is dropped (cancelled) when the
/// deadline passes.
pub async fn run_with_timeout<F, T>(
    operation: &'static str,
    limit: Option<Duration>,
    fut: F,
) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    let Some(limit) = limit else {
        return Ok(fut.await);
    };
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => Ok(value),
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "operation timed out");
            Err(TimedOut {
                operation,
                elapsed: limit,
            })
        },
    }
}
