//! Retry with exponential backoff for recoverable errors
//!
//! Delays double from `initial_interval` up to `max_interval`. Both the
//! attempt and the wait between attempts race the caller's cancellation
//! token, so cancelling never waits out a backoff delay.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ServiceError};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries)
    pub max_retries: u32,

    pub initial_interval: Duration,

    /// Upper bound for a single delay
    pub max_interval: Duration,

    pub multiplier: f64,

    /// Jitter applied to each delay (0.0 disables it)
    pub randomization_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            randomization_factor: 0.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// The delays this policy would wait between attempts, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (0..self.max_retries)
            .filter_map(|_| backoff.next_backoff())
            .collect()
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryConfig {{ max_retries: {}, initial_interval: {:?}, max_interval: {:?}, multiplier: {} }}",
            self.max_retries, self.initial_interval, self.max_interval, self.multiplier
        )
    }
}

/// Executor for retry operations with exponential backoff
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// exhausts the retry budget, or `cancel` fires.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_if(cancel, ServiceError::is_retryable, operation).await
    }

    /// Like [`execute`](Self::execute), but `should_retry` decides which
    /// errors earn another attempt.
    pub async fn execute_if<F, Fut, T, P>(
        &self,
        cancel: &CancellationToken,
        should_retry: P,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&ServiceError) -> bool,
    {
        let mut backoff = self.config.backoff();
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
                result = operation() => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if should_retry(&err) && attempts < self.config.max_retries => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(self.config.max_interval);
                    attempts += 1;
                    log::warn!(
                        "Operation failed with retryable error, retrying in {:?} (attempt {}/{}): {}",
                        delay,
                        attempts,
                        self.config.max_retries,
                        err
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            log::debug!("Retry wait aborted by cancellation");
                            return Err(ServiceError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) if attempts > 0 => return Err(err.with_context_value("attempts", attempts + 1)),
                Err(err) => return Err(err),
            }
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
