use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ProviderError;
use crate::model::DEFAULT_RETRY_BASE_DELAY;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based): `base × 2^(attempt−1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Every backoff delay this policy would sleep through, in order.
    pub fn delays(&self) -> Vec<Duration> {
        (1..=self.max_retries).map(|a| self.delay_for(a)).collect()
    }

    /// Runs `operation`, retrying transient failures up to `max_retries`
    /// times. Non-retryable errors are returned immediately.
    pub async fn run<T, F, Fut>(&self, vendor: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        vendor,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient provider failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_retryable() && self.max_retries > 0 => {
                    return Err(ProviderError::retry_exhausted(vendor, attempt + 1, err));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}
