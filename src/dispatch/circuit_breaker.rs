//! Per-route circuit breaker.
//!
//! Each upstream route gets its own breaker so that one dead backend fails
//! fast without affecting the others.
//!
//! ```text
//!   Closed ── failures ≥ failure_threshold ──► Open
//!     ▲                                         │
//!     │                                         │ open_duration elapsed
//!     │                                         ▼
//!     └──── successes ≥ success_threshold ── HalfOpen ── any failure ──► Open
//! ```
//!
//! Only dispatch failures (timeouts, refused connections, broken transport)
//! count against the breaker. A backend answering 4xx/5xx is alive and
//! counts as a success.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::DispatchFailure;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn gauge_value(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
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

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,
    /// Consecutive half-open successes before closing.
    pub success_threshold: u32,
    /// How long to fail fast before probing again.
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(30),
        }
    }
}

impl From<&crate::config::Config> for CircuitBreakerConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            failure_threshold: config.circuit_breaker_failure_threshold,
            success_threshold: config.circuit_breaker_success_threshold,
            open_duration: config.circuit_breaker_open_duration,
        }
    }
}

struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

pub struct CircuitBreaker {
    route: String,
    config: CircuitBreakerConfig,
    inner: RwLock<Inner>,
    times_opened: AtomicU32,
    requests_rejected: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(route: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            route: route.into(),
            config,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                opened_at: None,
                consecutive_failures: 0,
                consecutive_successes: 0,
            }),
            times_opened: AtomicU32::new(0),
            requests_rejected: AtomicU64::new(0),
        }
    }

    /// Admit a dispatch, or refuse it with [`DispatchFailure::CircuitOpen`].
    ///
    /// An open breaker whose `open_duration` has elapsed moves to half-open
    /// and admits the caller as a probe.
    pub async fn try_acquire(&self) -> Result<(), DispatchFailure> {
        {
            let inner = self.inner.read().await;
            match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => return Ok(()),
                CircuitState::Open if !self.open_expired(&inner) => {
                    return Err(self.reject());
                }
                CircuitState::Open => {}
            }
        }

        // Re-check under the write lock; another task may have moved first.
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Open if self.open_expired(&inner) => {
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.consecutive_successes = 0;
                Ok(())
            }
            CircuitState::Open => Err(self.reject()),
            _ => Ok(()),
        }
    }

    /// Record a dispatch that reached the backend.
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                debug!(
                    route = %self.route,
                    successes = inner.consecutive_successes,
                    threshold = self.config.success_threshold,
                    "Half-open probe succeeded"
                );
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                    inner.opened_at = None;
                    inner.consecutive_failures = 0;
                }
            }
            // A request admitted just before another task opened the breaker.
            CircuitState::Open => {}
        }
    }

    /// Record a dispatch failure.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes = 0;
                self.open(&mut inner);
            }
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn times_opened(&self) -> u32 {
        self.times_opened.load(Ordering::Relaxed)
    }

    pub fn requests_rejected(&self) -> u64 {
        self.requests_rejected.load(Ordering::Relaxed)
    }

    fn open_expired(&self, inner: &Inner) -> bool {
        inner
            .opened_at
            .is_none_or(|at| at.elapsed() >= self.config.open_duration)
    }

    fn reject(&self) -> DispatchFailure {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
        metrics::record_circuit_breaker_rejection(&self.route);
        DispatchFailure::CircuitOpen
    }

    fn open(&self, inner: &mut Inner) {
        inner.opened_at = Some(Instant::now());
        self.times_opened.fetch_add(1, Ordering::Relaxed);
        metrics::record_circuit_breaker_open(&self.route);
        warn!(
            route = %self.route,
            failures = inner.consecutive_failures,
            open_duration = ?self.config.open_duration,
            "Circuit breaker opened"
        );
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        metrics::set_circuit_breaker_state(&self.route, to.gauge_value());
        info!(route = %self.route, %from, %to, "Circuit breaker state changed");
    }
}
