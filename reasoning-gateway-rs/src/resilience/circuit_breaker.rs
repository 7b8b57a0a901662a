//! Circuit breaker implementation for preventing cascading failures
//!
//! `Closed -> Open` after `failure_threshold` consecutive failures.
//! `Open -> HalfOpen` once `reset_timeout` has elapsed; exactly one trial call
//! is admitted while half-open and concurrent callers are rejected.
//! A trial success closes the circuit; a trial failure re-opens it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::CircuitBreakerStatus;
use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before the circuit opens
    pub failure_threshold: usize,

    /// How long the circuit stays open before admitting a trial call
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitBreakerStatus,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// A thread-safe circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: Mutex<BreakerState>,
    total_failures: AtomicUsize,
    total_successes: AtomicUsize,
    total_rejections: AtomicUsize,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::named("default", config)
    }

    pub fn named(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(BreakerState {
                status: CircuitBreakerStatus::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            total_failures: AtomicUsize::new(0),
            total_successes: AtomicUsize::new(0),
            total_rejections: AtomicUsize::new(0),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask permission for one call. Every `Ok` must be followed by exactly one
    /// of `record_success`, `record_failure` or `release`.
    pub fn acquire(&self) -> Result<()> {
        let mut state = self.lock();
        match state.status {
            CircuitBreakerStatus::Closed => Ok(()),
            CircuitBreakerStatus::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.reset_timeout);
                if elapsed >= self.config.reset_timeout {
                    log::info!("Circuit breaker '{}' transitioning to Half-Open state", self.name);
                    state.status = CircuitBreakerStatus::HalfOpen;
                    state.trial_in_flight = true;
                    Ok(())
                } else {
                    drop(state);
                    self.reject(format!(
                        "circuit '{}' is open, retry in {:?}",
                        self.name,
                        self.config.reset_timeout.saturating_sub(elapsed)
                    ))
                }
            }
            CircuitBreakerStatus::HalfOpen => {
                if state.trial_in_flight {
                    drop(state);
                    self.reject(format!("circuit '{}' is half-open with a trial in flight", self.name))
                } else {
                    state.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn reject(&self, message: String) -> Result<()> {
        self.total_rejections.fetch_add(1, Ordering::Relaxed);
        Err(ServiceError::circuit_broken(message))
    }

    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        match state.status {
            CircuitBreakerStatus::Closed => state.consecutive_failures = 0,
            CircuitBreakerStatus::HalfOpen => {
                log::info!("Circuit breaker '{}' transitioning to Closed state", self.name);
                state.status = CircuitBreakerStatus::Closed;
                state.consecutive_failures = 0;
                state.opened_at = None;
                state.trial_in_flight = false;
            }
            CircuitBreakerStatus::Open => {
                log::debug!("Circuit breaker '{}' received success while open, ignoring", self.name);
            }
        }
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        match state.status {
            CircuitBreakerStatus::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    log::warn!(
                        "Circuit breaker '{}' transitioning to Open state after {} consecutive failures",
                        self.name,
                        state.consecutive_failures
                    );
                    Self::open(&mut state);
                }
            }
            CircuitBreakerStatus::HalfOpen => {
                log::warn!("Circuit breaker '{}' trial call failed, re-opening", self.name);
                Self::open(&mut state);
            }
            CircuitBreakerStatus::Open => {
                log::debug!("Circuit breaker '{}' received failure while open, ignoring", self.name);
            }
        }
    }

    /// Give back a permit without an outcome (e.g. the call was cancelled).
    pub fn release(&self) {
        let mut state = self.lock();
        if state.status == CircuitBreakerStatus::HalfOpen {
            state.trial_in_flight = false;
        }
    }

    fn open(state: &mut BreakerState) {
        state.status = CircuitBreakerStatus::Open;
        state.opened_at = Some(Instant::now());
        state.trial_in_flight = false;
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.status = CircuitBreakerStatus::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.trial_in_flight = false;
    }

    /// Current status. An expired open window still reports `Open` until the
    /// next `acquire` moves it to half-open.
    pub fn status(&self) -> CircuitBreakerStatus {
        self.lock().status
    }

    pub fn failure_count(&self) -> usize {
        self.lock().consecutive_failures
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.lock();
        CircuitBreakerMetrics {
            status: state.status,
            consecutive_failures: state.consecutive_failures,
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            opened_duration: state.opened_at.map(|at| at.elapsed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub status: CircuitBreakerStatus,
    pub consecutive_failures: usize,
    pub total_failures: usize,
    pub total_successes: usize,
    pub total_rejections: usize,
    pub opened_duration: Option<Duration>,
}
