//! Circuit Breaker Pattern
//!
//! Protects the fresh-fetch path from a failing upstream by short-circuiting
//! to a fallback while the upstream is unhealthy.
//!
//! ```text
//! Closed   -> Open:     failures in monitoring window >= failure_threshold
//! Open     -> HalfOpen: recovery_timeout elapsed since last failure
//! HalfOpen -> Closed:   success_threshold successes
//! HalfOpen -> Open:     any failure
//! ```

use crate::domain::ports::Clock;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of failures inside the window before opening the circuit
    pub failure_threshold: u32,
    /// Duration to keep circuit open before probing
    pub recovery_timeout: Duration,
    /// Window for counting failures (failures older than this are forgotten)
    pub monitoring_window: Duration,
    /// Number of successes in half-open to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls allowed
    #[default]
    Closed,
    /// Circuit tripped - calls short-circuited to the fallback
    Open,
    /// Testing recovery - calls allowed until they succeed or fail
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Default)]
struct CircuitInner {
    state: CircuitState,
    /// Failure timestamps (epoch ms) inside the monitoring window
    failures: VecDeque<u64>,
    /// Successes accumulated while half-open
    half_open_successes: u32,
    last_failure_ms: Option<u64>,
    total_calls: u64,
    total_failures: u64,
}

impl CircuitInner {
    fn prune(&mut self, now: u64, window: Duration) {
        let window_ms = window.as_millis() as u64;
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_sub(oldest) > window_ms {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Circuit breaker guarding a single operation.
///
/// State lives behind one mutex that is never held across an `.await`.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` under the breaker.
    ///
    /// Returns the operation's value on success. On failure, or when the
    /// circuit is open, returns `fallback()` instead; the operation's error is
    /// logged and never propagated.
    pub async fn execute<T, E, Op, OpFut, Fb, FbFut>(&self, operation: Op, fallback: Fb) -> T
    where
        Op: FnOnce() -> OpFut,
        OpFut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
    {
        if !self.allow_request() {
            tracing::debug!("circuit breaker {} is open, serving fallback", self.name);
            return fallback().await;
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                value
            }
            Err(e) => {
                tracing::warn!("circuit breaker {} recorded failure: {}", self.name, e);
                self.record_failure();
                fallback().await
            }
        }
    }

    /// Record a call and check whether it may proceed.
    ///
    /// Returns true if allowed, false if the circuit is open.
    pub fn allow_request(&self) -> bool {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.prune(now, self.config.monitoring_window);

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let last_failure = inner.last_failure_ms.unwrap_or(0);
                let recovery_ms = self.config.recovery_timeout.as_millis() as u64;

                if now.saturating_sub(last_failure) >= recovery_ms {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    tracing::info!("circuit breaker {} transitioning to half-open", self.name);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures.clear();
                    inner.half_open_successes = 0;
                    tracing::info!("circuit breaker {} closed (recovered)", self.name);
                }
            }
            CircuitState::Closed => {
                // A single success forgets all recent failures
                inner.failures.clear();
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened; nothing to do
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.last_failure_ms = Some(now);
        inner.failures.push_back(now);
        inner.prune(now, self.config.monitoring_window);

        match inner.state {
            CircuitState::Closed => {
                let failures = inner.failures.len() as u32;
                if failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        "circuit breaker {} opened after {} failures",
                        self.name,
                        failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
                tracing::warn!("circuit breaker {} re-opened (failed in half-open)", self.name);
            }
            CircuitState::Open => {
                // Already open; last_failure_ms moved forward, extending the timeout
            }
        }
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Lifetime success ratio (1.0 before any call).
    pub fn health_score(&self) -> f64 {
        let inner = self.inner.lock();
        Self::success_ratio(inner.total_calls, inner.total_failures)
    }

    /// Get a metrics snapshot.
    pub fn metrics(&self) -> CircuitMetrics {
        let inner = self.inner.lock();
        CircuitMetrics {
            name: self.name.clone(),
            state: inner.state,
            window_failures: inner.failures.len() as u32,
            half_open_successes: inner.half_open_successes,
            last_failure_ms: inner.last_failure_ms,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            health_score: Self::success_ratio(inner.total_calls, inner.total_failures),
        }
    }

    /// Force the circuit closed and clear all counters.
    pub fn reset(&self) {
        *self.inner.lock() = CircuitInner::default();
        tracing::info!("circuit breaker {} manually reset", self.name);
    }

    fn success_ratio(total_calls: u64, total_failures: u64) -> f64 {
        if total_calls == 0 {
            1.0
        } else {
            total_calls.saturating_sub(total_failures) as f64 / total_calls as f64
        }
    }
}

/// Metrics for a circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitMetrics {
    pub name: String,
    pub state: CircuitState,
    pub window_failures: u32,
    pub half_open_successes: u32,
    pub last_failure_ms: Option<u64>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub health_score: f64,
}
