//! Transient backoff — retries a single upstream call on 500/503 with
//! exponentially growing delays. Independent of credential rotation: it runs
//! inside one rotation attempt, against one credential.

use std::future::Future;
use std::time::Duration;
use yoso_config::BackoffConfig;
use yoso_types::traits::Result;

/// Retry schedule for server-side transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl From<&BackoffConfig> for Backoff {
    fn from(c: &BackoffConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            initial_delay: c.initial_delay(),
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt_index + 1`: `initial_delay * 2^attempt_index`.
    #[must_use]
    pub fn delay(&self, attempt_index: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt_index))
    }

    /// Runs `f`, retrying while it fails with 500/503 and attempts remain.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error, or the last transient one once
    /// attempts are exhausted.
    pub async fn retry<T, F, Fut>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt_index = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_server_transient() && attempt_index + 1 < attempts => {
                    let delay = self.delay(attempt_index);
                    tracing::debug!(
                        attempt = attempt_index + 1,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "transient upstream failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt_index += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Shorthand for `Backoff { max_attempts, initial_delay }.retry(f)`.
///
/// # Errors
///
/// See [`Backoff::retry`].
pub async fn retry_transient<T, F, Fut>(
    max_attempts: u32,
    initial_delay: Duration,
    f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Backoff {
        max_attempts,
        initial_delay,
    }
    .retry(f)
    .await
}
