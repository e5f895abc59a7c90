use crate::error::ServiceError;
use backon::{ExponentialBuilder, Retryable};
use log::warn;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff applied to calls against hosted model APIs.
///
/// Every attempt is limited by `timeout`; an expired attempt counts as a
/// transient failure. Only transient failures are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff between attempts, with jitter
    fn strategy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(self.multiplier.max(1) as f32)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let timeout = self.timeout;
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        let attempt_with_timeout = || {
            let pending = call();
            async move {
                match tokio::time::timeout(timeout, pending).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::Timeout(timeout)),
                }
            }
        };

        attempt_with_timeout
            .retry(self.strategy())
            .when(ServiceError::is_transient)
            .notify(|err: &ServiceError, delay: Duration| {
                attempt += 1;
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation, attempt, max_attempts, err, delay
                );
            })
            .await
    }
}
