//! Retrying wrapper around any transport.
//!
//! Retries transient provider errors with exponential backoff. Permanent
//! errors (authentication, unknown model) are returned immediately and a
//! rate-limit hint replaces the computed delay for the next attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use saiten_core::traits::{CompletionRequest, CompletionResponse, LlmProvider, ModelInfo};

use crate::error::ProviderError;

/// Upper bound for a single backoff delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Wraps a provider with a retry policy.
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryingProvider {
    /// `max_retries` extra attempts, starting at `retry_delay` and doubling.
    pub fn new(inner: Arc<dyn LlmProvider>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            retry_delay,
        }
    }
}

fn is_permanent(e: &anyhow::Error) -> bool {
    e.downcast_ref::<ProviderError>()
        .is_some_and(ProviderError::is_permanent)
}

fn retry_hint(e: &anyhow::Error) -> Option<Duration> {
    e.downcast_ref::<ProviderError>()
        .and_then(ProviderError::retry_after_ms)
        .map(Duration::from_millis)
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let mut retry_delay = self.retry_delay;
        let mut attempt = 0;

        loop {
            let e = match self.inner.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if is_permanent(&e) || attempt >= self.max_retries {
                return Err(e);
            }
            attempt += 1;

            let delay = retry_hint(&e).unwrap_or(retry_delay).min(MAX_RETRY_DELAY);
            tracing::warn!(
                provider = self.inner.name(),
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "transient provider error, retrying"
            );
            tokio::time::sleep(delay).await;
            retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
        }
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        self.inner.list_models().await
    }
}
