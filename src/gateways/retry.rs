//! Exponential backoff retry for outbound API calls.
//!
//! - Default: 3 retries with 1s, 2s, 4s delays
//! - Only transient errors are retried; permanent errors return immediately

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::error::{GatewayError, GatewayErrorKind};

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 3 retries with 1s, 2s, 4s delays.
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(8),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay before retry `attempt` (0-indexed): `initial * multiplier^attempt`,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Whether a client retries at all. Tests use `NoRetry`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    RetryTransient,
    NoRetry,
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T> {
    Success(T),

    /// Every attempt failed transiently.
    ExhaustedRetries {
        last_error: GatewayError,
        /// Attempts made, including the first.
        attempts: u32,
    },

    PermanentError(GatewayError),
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, GatewayError> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::PermanentError(e) => Err(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Runs `operation`, retrying transient failures per `config`.
pub async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    policy: RetryPolicy,
    mut operation: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let max_attempts = match policy {
        RetryPolicy::NoRetry => 1,
        RetryPolicy::RetryTransient => config.max_retries + 1,
    };
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => {
                attempt += 1;

                match e.kind {
                    GatewayErrorKind::Permanent => return RetryResult::PermanentError(e),
                    GatewayErrorKind::Transient => {
                        if attempt >= max_attempts {
                            return RetryResult::ExhaustedRetries {
                                last_error: e,
                                attempts: attempt,
                            };
                        }

                        let delay = config.delay_for_attempt(attempt - 1);
                        debug!(attempt, ?delay, error = %e, "Transient gateway error, retrying");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
