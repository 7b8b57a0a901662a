//! Resilience patterns for outbound calls
//!
//! This module provides:
//! - Retry with exponential backoff and cancellation
//! - Circuit breaker with a single half-open trial
//! - Token-bucket rate limiting
//! - A facade composing all three, and a registry handing out one facade per
//!   named dependency so that one failing provider cannot starve the others

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics};
pub use rate_limiter::{RateLimiterConfig, TokenBucket};
pub use retry::{RetryConfig, RetryExecutor};

use std::future::Future;
use std::sync::Arc;

use config_rs::GatewaySettings;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ServiceError};

/// Configuration for one `Resilience` instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limiter: RateLimiterConfig,
}

impl From<&GatewaySettings> for ResilienceConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            retry: RetryConfig {
                max_retries: settings.max_retries,
                initial_interval: settings.retry_base_delay,
                max_interval: settings.retry_max_delay,
                ..RetryConfig::default()
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: settings.failure_threshold as usize,
                reset_timeout: settings.breaker_cooldown,
            },
            rate_limiter: RateLimiterConfig {
                capacity: settings.rate_limit_capacity,
                refill_interval: settings.rate_limit_refill_interval,
            },
        }
    }
}

/// A unified resilience facade that composes rate limiting, circuit breaking
/// and retries around a fallible async operation.
#[derive(Debug, Clone)]
pub struct Resilience {
    name: Arc<str>,
    retry: RetryExecutor,
    circuit_breaker: Arc<CircuitBreaker>,
    rate_limiter: Arc<TokenBucket>,
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new("default", ResilienceConfig::default())
    }
}

impl Resilience {
    pub fn new(name: impl Into<String>, config: ResilienceConfig) -> Self {
        let name: String = name.into();
        Self {
            retry: RetryExecutor::new(config.retry),
            circuit_breaker: Arc::new(CircuitBreaker::named(name.clone(), config.circuit_breaker)),
            rate_limiter: Arc::new(TokenBucket::named(name.clone(), config.rate_limiter)),
            name: Arc::from(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute with the configured retry policy.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry = self.retry.clone();
        self.run(&retry, cancel, ServiceError::is_retryable, operation).await
    }

    /// Execute with an explicit retry budget, keeping the breaker and limiter
    /// shared with every other caller of this dependency.
    pub async fn execute_with_retries<F, Fut, T>(
        &self,
        max_retries: u32,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_retrying_on(max_retries, cancel, ServiceError::is_retryable, operation)
            .await
    }

    /// Execute with an explicit retry budget and retry predicate. The breaker
    /// still counts only transient errors as failures.
    pub async fn execute_retrying_on<F, Fut, T, P>(
        &self,
        max_retries: u32,
        cancel: &CancellationToken,
        should_retry: P,
        operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&ServiceError) -> bool,
    {
        let retry = RetryExecutor::new(self.retry.config().clone().with_max_retries(max_retries));
        self.run(&retry, cancel, should_retry, operation).await
    }

    async fn run<F, Fut, T, P>(
        &self,
        retry: &RetryExecutor,
        cancel: &CancellationToken,
        should_retry: P,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&ServiceError) -> bool,
    {
        let breaker = &self.circuit_breaker;
        let limiter = &self.rate_limiter;

        retry
            .execute_if(cancel, should_retry, || {
                let permitted = breaker.acquire().and_then(|_| {
                    limiter.try_acquire().map_err(|err| {
                        breaker.release();
                        err
                    })
                });
                let attempt = permitted.map(|_| operation());
                async move {
                    let fut = attempt?;
                    let guard = OutcomeGuard::new(breaker);
                    let result = fut.await;
                    match &result {
                        Ok(_) => guard.success(),
                        Err(err) if err.is_retryable() => guard.failure(),
                        Err(err) if err.is_cancelled() => guard.release(),
                        // The dependency answered; the request itself was bad.
                        Err(_) => guard.success(),
                    }
                    result
                }
            })
            .await
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.circuit_breaker.status()
    }

    pub fn rate_limiter(&self) -> &TokenBucket {
        &self.rate_limiter
    }

    pub fn reset_circuit_breaker(&self) {
        self.circuit_breaker.reset();
    }
}

/// Records exactly one breaker outcome per admitted call. A call dropped
/// mid-flight (e.g. by cancellation) releases its permit.
struct OutcomeGuard<'a> {
    breaker: Option<&'a CircuitBreaker>,
}

impl<'a> OutcomeGuard<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker: Some(breaker),
        }
    }

    fn success(mut self) {
        if let Some(b) = self.breaker.take() {
            b.record_success();
        }
    }

    fn failure(mut self) {
        if let Some(b) = self.breaker.take() {
            b.record_failure();
        }
    }

    fn release(mut self) {
        if let Some(b) = self.breaker.take() {
            b.release();
        }
    }
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if let Some(b) = self.breaker.take() {
            b.release();
        }
    }
}

/// Hands out one shared `Resilience` per named dependency
/// (e.g. `reasoning:anthropic`, `source_control`, `sandbox`).
#[derive(Debug, Clone, Default)]
pub struct ResilienceRegistry {
    config: ResilienceConfig,
    entries: Arc<DashMap<String, Resilience>>,
}

impl ResilienceRegistry {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// The instance for `name`, created with the registry defaults on first use.
    pub fn get(&self, name: &str) -> Resilience {
        self.entries
            .entry(name.to_string())
            .or_insert_with(|| Resilience::new(name, self.config.clone()))
            .clone()
    }

    /// Register `name` with its own configuration, replacing any existing entry.
    pub fn configure(&self, name: &str, config: ResilienceConfig) -> Resilience {
        let resilience = Resilience::new(name, config);
        self.entries.insert(name.to_string(), resilience.clone());
        resilience
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }
}

/// Status of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerStatus {
    /// Circuit is closed, allowing requests
    Closed,

    /// Circuit is open, rejecting requests
    Open,

    /// Circuit is half-open, admitting one trial request
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}
