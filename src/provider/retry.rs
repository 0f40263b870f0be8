//! Retry with exponential backoff for transient provider failures.
//!
//! Only connection establishment is retried; the agent loop itself never
//! retries a turn.

use super::error::{ProviderError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Run `operation`, retrying retryable errors with exponential backoff and
/// jitter. Non-retryable errors surface immediately.
pub async fn retry_with_backoff<T, F, Fut>(mut operation: F, config: &RetryConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let exp = config.base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
                let capped = exp.min(config.max_delay);
                let jitter_ms = rand::rng().random_range(0..=capped.as_millis().max(1) as u64 / 4);
                let delay = capped + Duration::from_millis(jitter_ms);
                tracing::warn!(
                    "provider request failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt,
                    config.max_retries,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
