//! Per-call timeout and bounded retry for external providers
//!
//! Every search, embedding and completion call runs under its own timeout.
//! A timeout is reported exactly like a transport failure of that call.
//! Failed calls are retried a bounded number of times (default 1) with
//! binary exponential backoff and ±25% jitter; the last error is returned
//! unchanged once attempts run out.

use crate::config::{RetryConfig, TimeoutConfig};
use crate::errors::{RagError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Base delay for exponential backoff
const BASE_DELAY_MS: u64 = 250;

/// Maximum delay cap
const MAX_DELAY_MS: u64 = 4000;

/// Kind of external call, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Search,
    Embedding,
    Completion,
}

impl CallKind {
    /// Build the error variant that belongs to this kind of call
    pub fn error(self, message: impl Into<String>) -> RagError {
        let message = message.into();
        match self {
            CallKind::Search => RagError::Retrieval(message),
            CallKind::Embedding => RagError::Embedding(message),
            CallKind::Completion => RagError::Generation(message),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Search => "search",
            CallKind::Embedding => "embedding",
            CallKind::Completion => "completion",
        }
    }
}

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    max_retries: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Enable jitter
    enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    /// Create retry policy with default settings
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Create retry policy with custom settings
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS.max(base_delay_ms),
            enable_jitter: true,
        }
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.enable_jitter = false;
        self
    }

    /// Run `operation` under `timeout`, retrying provider failures
    pub async fn execute<F, Fut, T>(
        &self,
        kind: CallKind,
        timeout: Duration,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;

        loop {
            let outcome = match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(kind.error(format!(
                    "{} call timed out after {}ms",
                    kind.as_str(),
                    timeout.as_millis()
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !self.is_retryable(&e) || retries >= self.max_retries {
                        return Err(e);
                    }

                    let delay = self.calculate_delay(retries);
                    retries += 1;
                    tracing::warn!(
                        call = kind.as_str(),
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "provider call failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Delay before retry number `retry` (0-based)
    fn calculate_delay(&self, retry: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry));

        let delay_ms = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Only provider failures are transient; everything else is final
    fn is_retryable(&self, error: &RagError) -> bool {
        error.is_provider_error()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Timeouts per call kind plus the shared retry policy
#[derive(Debug, Clone)]
pub struct CallPolicies {
    pub search_timeout: Duration,
    pub embedding_timeout: Duration,
    pub completion_timeout: Duration,
    pub retry: RetryPolicy,
}

impl CallPolicies {
    pub fn new(timeouts: &TimeoutConfig, retry: &RetryConfig) -> Self {
        Self {
            search_timeout: Duration::from_millis(timeouts.search_ms),
            embedding_timeout: Duration::from_millis(timeouts.embedding_ms),
            completion_timeout: Duration::from_millis(timeouts.completion_ms),
            retry: RetryPolicy::with_config(retry.max_retries, retry.base_delay_ms),
        }
    }

    pub fn timeout_for(&self, kind: CallKind) -> Duration {
        match kind {
            CallKind::Search => self.search_timeout,
            CallKind::Embedding => self.embedding_timeout,
            CallKind::Completion => self.completion_timeout,
        }
    }

    /// Run one external call under its kind's timeout and the retry policy
    pub async fn run<F, Fut, T>(&self, kind: CallKind, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry
            .execute(kind, self.timeout_for(kind), operation)
            .await
    }
}

impl Default for CallPolicies {
    fn default() -> Self {
        Self::new(&TimeoutConfig::default(), &RetryConfig::default())
    }
}
