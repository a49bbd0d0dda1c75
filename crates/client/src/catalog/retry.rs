//! Retry with exponential backoff for transient catalog failures.

use std::future::Future;
use std::time::Duration;

use super::CatalogError;

/// Retry tuning.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(250), max_delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (attempt counts from 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
pub async fn retry_transient<T, F, Fut>(name: &str, policy: RetryPolicy, mut operation: F) -> Result<T, CatalogError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(operation = name, attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %e, "catalog request failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if attempt > 1 {
                    tracing::warn!(operation = name, attempts = attempt, error = %e, "catalog request failed");
                }
                return Err(e);
            }
        }
    }
}
