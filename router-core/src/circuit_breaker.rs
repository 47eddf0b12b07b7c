//! # Circuit Breaker Module
//!
//! Per-backend failure tracking with a three-state machine (CLOSED, OPEN,
//! HALF_OPEN). The breaker classifies outcomes and fails fast while a
//! backend is suspected unhealthy; it never retries on its own — retries
//! are the backend invoker's job, one logical `call` per attempt.
//!
//! ## States
//!
//! - **CLOSED**: normal operation. Consecutive failures are counted; once
//!   they reach `failure_threshold` the breaker opens.
//! - **OPEN**: every call is rejected immediately until `recovery_timeout`
//!   has elapsed since the last failure, at which point the next call
//!   transitions to HALF_OPEN and is allowed through.
//! - **HALF_OPEN**: trial state. A single failure reopens the circuit
//!   immediately; `success_threshold` consecutive successes close it.
//!
//! ## Example
//!
//! ```rust
//! use router_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn run() {
//! let breaker = CircuitBreaker::new("backend-a".to_string(), CircuitBreakerConfig::default());
//!
//! let result = breaker.call(|| async {
//!     Ok::<_, std::io::Error>("response")
//! }).await;
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Circuit breaker specific errors, distinct from the backend's own
/// failure kinds (those live in [`crate::error::RouterError`]).
#[derive(Debug, Error, Clone, Copy)]
pub enum CircuitBreakerError {
    /// The circuit is OPEN; the wrapped operation was never invoked.
    #[error("circuit breaker is open")]
    Open,
    /// The wrapped operation did not complete before `request_timeout`.
    #[error("circuit breaker timeout")]
    Timeout,
}

/// Circuit breaker operational states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Configuration for one breaker instance (§4.7 Breaker defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED before transitioning to OPEN.
    pub failure_threshold: u32,
    /// Consecutive successes in HALF_OPEN before transitioning to CLOSED.
    pub success_threshold: u32,
    /// Time since `last_failure_time` before OPEN allows a trial call.
    #[serde(rename = "recovery_timeout_seconds", with = "crate::common::duration_serde")]
    pub recovery_timeout: Duration,
    /// Deadline applied to the wrapped operation; an overrun counts as a
    /// `Timeout` failure.
    #[serde(rename = "timeout_seconds", with = "crate::common::duration_serde")]
    pub request_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    last_state_change: Instant,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    total_timeouts: u64,
    total_open_rejections: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_state_change: Instant::now(),
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            total_timeouts: 0,
            total_open_rejections: 0,
        }
    }
}

/// Point-in-time snapshot of a breaker's state, counters and config,
/// suitable for an admin dump or a `stats()` call (§4.1).
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub current_failure_count: u32,
    pub current_success_count: u32,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_timeouts: u64,
    pub total_open_rejections: u64,
    pub seconds_since_state_change: f64,
    pub config: CircuitBreakerConfig,
}

/// Per-backend circuit breaker. Thread-safe: all reads and mutations are
/// serialized through a single `RwLock`-guarded state so that a concurrent
/// `call` and a concurrent `stats()` read never observe a torn state.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<RwLock<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Arc::new(RwLock::new(Inner::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute `operation` under breaker protection.
    ///
    /// If OPEN and the recovery window hasn't elapsed, fails immediately
    /// with [`CircuitBreakerError::Open`] and does not invoke `operation`.
    /// If the window has elapsed, transitions to HALF_OPEN and proceeds.
    /// The call is wrapped with a deadline of `request_timeout`; an
    /// overrun is classified as [`CircuitBreakerError::Timeout`], itself a
    /// failure for state-machine purposes.
    ///
    /// The operation's own error `E` is preserved in the `Ok(Err(e))` case
    /// so the caller can classify and retry it — only the breaker's own
    /// rejections (`Open`, `Timeout`) are surfaced as the outer error.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<Result<T, E>, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::Open);
        }

        match tokio::time::timeout(self.config.request_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success().await;
                Ok(Ok(value))
            }
            Ok(Err(e)) => {
                self.on_failure().await;
                Ok(Err(e))
            }
            Err(_) => {
                self.on_timeout().await;
                Err(CircuitBreakerError::Timeout)
            }
        }
    }

    /// Decide whether a call may proceed, applying the OPEN -> HALF_OPEN
    /// recovery-window transition as a side effect.
    async fn admit(&self) -> bool {
        let mut inner = self.inner.write().await;
        inner.total_requests += 1;

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .last_failure_time
                .map(|t| t.elapsed())
                .unwrap_or(Duration::MAX);
            if elapsed >= self.config.recovery_timeout {
                self.transition(&mut inner, CircuitState::HalfOpen, "recovery timeout elapsed");
            } else {
                inner.total_open_rejections += 1;
                return false;
            }
        }

        true
    }

    async fn on_success(&self) {
        let mut inner = self.inner.write().await;
        inner.total_successes += 1;

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(
                        &mut inner,
                        CircuitState::Closed,
                        "success threshold reached in half-open",
                    );
                }
            }
            CircuitState::Open => {
                tracing::warn!(breaker = %self.name, "success observed while breaker OPEN");
            }
        }
    }

    async fn on_timeout(&self) {
        let mut inner = self.inner.write().await;
        inner.total_timeouts += 1;
        drop(inner);
        self.record_failure().await;
    }

    async fn on_failure(&self) {
        self.record_failure().await;
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.total_failures += 1;
        inner.last_failure_time = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(
                        &mut inner,
                        CircuitState::Open,
                        "consecutive failure threshold reached",
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open, "failure in half-open");
            }
            CircuitState::Open => {}
        }
    }

    /// Move to `new_state`, resetting the transient failure/success
    /// counters the way every transition in §4.1 does.
    fn transition(&self, inner: &mut Inner, new_state: CircuitState, reason: &str) {
        let old = inner.state;
        inner.state = new_state;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_state_change = Instant::now();
        tracing::info!(breaker = %self.name, from = ?old, to = ?new_state, reason, "circuit breaker state transition");
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub async fn stats(&self) -> BreakerStats {
        let inner = self.inner.read().await;
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            current_failure_count: inner.failure_count,
            current_success_count: inner.success_count,
            total_requests: inner.total_requests,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_timeouts: inner.total_timeouts,
            total_open_rejections: inner.total_open_rejections,
            seconds_since_state_change: inner.last_state_change.elapsed().as_secs_f64(),
            config: self.config.clone(),
        }
    }

    /// Manually force CLOSED with transient counters zeroed (the admin
    /// reset operation mentioned in §3).
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        self.transition(&mut inner, CircuitState::Closed, "manual reset");
        inner.last_failure_time = None;
    }
}
