use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Failures older than this no longer count toward the threshold.
    pub failure_window: Duration,
    /// Time spent open before a single probe is let through.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(30),
            cooldown: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed {
        failures: u32,
        first_failure_at: Option<Instant>,
    },
    Open {
        opened_at: Instant,
    },
    HalfOpen {
        probe_in_flight: bool,
    },
}

#[derive(Debug, Error)]
pub enum BreakerError {
    #[error("circuit breaker `{name}` is open")]
    Open { name: String },
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Closed → Open after `failure_threshold` consecutive failures inside the window;
/// Open → HalfOpen after the cooldown; one probe decides between Closed and Open.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::Closed {
                failures: 0,
                first_failure_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> BreakerState {
        match *self.lock() {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    pub fn try_acquire(&self) -> Result<(), BreakerError> {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> Result<(), BreakerError> {
        let mut inner = self.lock();

        match *inner {
            Inner::Closed { .. } => Ok(()),
            Inner::Open { opened_at } if now.duration_since(opened_at) >= self.config.cooldown => {
                info!(breaker = %self.name, "circuit_breaker: half-open, letting one probe through");
                *inner = Inner::HalfOpen {
                    probe_in_flight: true,
                };
                Ok(())
            }
            Inner::HalfOpen {
                probe_in_flight: false,
            } => {
                *inner = Inner::HalfOpen {
                    probe_in_flight: true,
                };
                Ok(())
            }
            Inner::Open { .. } | Inner::HalfOpen { .. } => Err(BreakerError::Open {
                name: self.name.clone(),
            }),
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if matches!(*inner, Inner::HalfOpen { .. }) {
            info!(breaker = %self.name, "circuit_breaker: probe succeeded, closing");
        }
        *inner = Inner::Closed {
            failures: 0,
            first_failure_at: None,
        };
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.lock();

        let next = match *inner {
            Inner::Closed {
                failures,
                first_failure_at,
            } => {
                let in_window = first_failure_at
                    .is_some_and(|first| now.duration_since(first) <= self.config.failure_window);
                let (failures, first_failure_at) = if in_window {
                    (failures + 1, first_failure_at)
                } else {
                    (1, Some(now))
                };

                if failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "circuit_breaker: opening after consecutive failures"
                    );
                    Inner::Open { opened_at: now }
                } else {
                    Inner::Closed {
                        failures,
                        first_failure_at,
                    }
                }
            }
            Inner::HalfOpen { .. } => {
                warn!(breaker = %self.name, "circuit_breaker: probe failed, reopening");
                Inner::Open { opened_at: now }
            }
            Inner::Open { opened_at } => Inner::Open { opened_at },
        };

        *inner = next;
    }

    /// Runs `operation` through the breaker; it is not invoked while the breaker is open.
    /// A call dropped before finishing counts as a failure.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.try_acquire()?;

        let mut guard = Outcome {
            breaker: self,
            settled: false,
        };

        let result = operation().await;
        guard.settled = true;

        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Failed(err))
            }
        }
    }
}

struct Outcome<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for Outcome<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_failure();
        }
    }
}
