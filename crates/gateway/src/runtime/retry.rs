//! Bounded retry with exponential backoff for transient backend
//! failures.

use std::future::Future;
use std::time::Duration;

use cf_domain::{Error, Result};

/// Initial backoff; doubles per attempt (250ms, 500ms, 1s, …).
const BASE_BACKOFF: Duration = Duration::from_millis(250);

/// Run `op` up to `max_attempts` times, backing off between attempts.
///
/// Only transient errors (per [`Error::is_transient`]) are retried;
/// anything else returns immediately.
pub async fn with_retries<T, F, Fut>(label: &str, max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut backoff = BASE_BACKOFF;

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                tracing::warn!(
                    op = label,
                    attempt,
                    error = %e,
                    "transient failure; backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    // Unreachable: the loop always returns on its last attempt.
    Err(Error::Other(format!("retry loop for {label} exhausted")))
}
