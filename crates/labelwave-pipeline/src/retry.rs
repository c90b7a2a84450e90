//! Bounded retry with exponential backoff around one backend call.

use std::time::Duration;

use labelwave_ai::{Prompt, Provider, ProviderError};
use tracing::warn;

/// Default per-call deadline, on top of the HTTP client's own timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls per batch, first call included.
    pub max_attempts: u32,
    /// Growth factor between consecutive waits.
    pub multiplier: u32,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            multiplier: 2,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (0 for the first retry).
    pub fn delay(&self, base: Duration, retry: u32) -> Duration {
        base.saturating_mul(self.multiplier.saturating_pow(retry))
    }

    /// Call `provider`, retrying rate limits and timeouts with backoff.
    ///
    /// Returns the reply text, or the last error once the attempt budget is
    /// spent or a non-retryable error occurs.
    pub async fn call(&self, provider: &Provider, prompt: &Prompt) -> Result<String, ProviderError> {
        let attempts = self.max_attempts.max(1);
        let mut retry = 0;
        loop {
            let outcome = tokio::time::timeout(self.call_timeout, provider.classify(prompt))
                .await
                .unwrap_or(Err(ProviderError::Timeout));

            let err = match outcome {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && retry + 1 < attempts => e,
                Err(e) => return Err(e),
            };

            let mut wait = self.delay(provider.base_delay(), retry);
            if let ProviderError::RateLimited {
                retry_after: Some(after),
            } = &err
            {
                wait = wait.max(*after);
            }
            warn!(
                provider = provider.name(),
                attempt = retry + 1,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "retrying after backoff"
            );
            tokio::time::sleep(wait).await;
            retry += 1;
        }
    }
}
