use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::rate_limiter::RateLimiter;
use crate::error::PortError;

/// Timeout and bounded retry applied to every external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Base wait between attempts, multiplied by the attempt number.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout: Duration::from_secs(30),
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, timeout: Duration, backoff: Duration) -> Self {
        Self { max_retries, timeout, backoff }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `op` until it succeeds, fails permanently, or the retry budget is spent.
    pub async fn call<T, F, Fut>(&self, label: &str, op: F) -> Result<T, PortError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PortError>>,
    {
        self.run(label, None, op).await
    }

    /// Like [`RetryPolicy::call`], but every attempt first waits for a slot on
    /// `limiter`. The wait is not counted against the attempt timeout.
    pub async fn call_throttled<T, F, Fut>(
        &self,
        label: &str,
        limiter: &RateLimiter,
        op: F,
    ) -> Result<T, PortError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PortError>>,
    {
        self.run(label, Some(limiter), op).await
    }

    async fn run<T, F, Fut>(
        &self,
        label: &str,
        limiter: Option<&RateLimiter>,
        mut op: F,
    ) -> Result<T, PortError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PortError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if let Some(limiter) = limiter {
                limiter.acquire().await;
            }
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(PortError::Timeout(self.timeout)),
            };
            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(call = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(call = label, attempt, max_retries = self.max_retries, error = %e, "retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
