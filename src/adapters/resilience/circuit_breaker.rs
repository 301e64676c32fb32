//! In-process circuit breaker guarding one external dependency.
//!
//! All bookkeeping happens in one short critical section per breaker; the
//! guarded call itself runs outside the lock. In half-open only a single
//! probe is in flight, and a probe whose future is dropped before it
//! settles counts as a failed probe.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::foundation::Timestamp;
use crate::ports::{BreakerError, BreakerSnapshot, CircuitBreakerConfig, CircuitState, Clock};

#[derive(Debug, Default)]
struct Counters {
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
    times_opened: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Timestamp>,
    probe_in_flight: bool,
    counters: Counters,
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Circuit breaker for a single named dependency.
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerState>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            service: service.into(),
            config,
            clock,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probe_in_flight: false,
                counters: Counters::default(),
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. An open breaker past its recovery timeout still reads
    /// `Open` until a call arrives to probe it.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Runs `operation` through the breaker. Every error counts as a failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(operation, |_| true).await
    }

    /// Runs `operation` through the breaker; only errors for which
    /// `is_failure` returns true count against it. Other errors mean the
    /// dependency answered, and are recorded as successes.
    pub async fn execute_with<F, Fut, T, E, P>(
        &self,
        operation: F,
        is_failure: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let admission = self.admit().ok_or_else(|| BreakerError::Open {
            service: self.service.clone(),
        })?;

        let mut guard = CallGuard {
            breaker: self,
            admission,
            settled: false,
        };

        match tokio::time::timeout(self.config.call_timeout, operation()).await {
            Ok(Ok(value)) => {
                guard.settle(true);
                Ok(value)
            }
            Ok(Err(err)) => {
                guard.settle(!is_failure(&err));
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                guard.settle(false);
                tracing::warn!(
                    service = %self.service,
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "Guarded call timed out"
                );
                Err(BreakerError::Timeout {
                    service: self.service.clone(),
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    fn admit(&self) -> Option<Admission> {
        let now = self.clock.now();
        let (admission, probing) = {
            let mut inner = self.lock();
            let (admission, probing) = match inner.state {
                CircuitState::Closed => (Some(Admission::Normal), false),
                CircuitState::Open => {
                    let recovered = inner.last_failure_at.map_or(true, |at| {
                        now.secs_since(&at) >= self.config.recovery_timeout.as_secs_f64()
                    });
                    if recovered {
                        inner.state = CircuitState::HalfOpen;
                        inner.probe_in_flight = true;
                        (Some(Admission::Probe), true)
                    } else {
                        (None, false)
                    }
                }
                CircuitState::HalfOpen if inner.probe_in_flight => (None, false),
                CircuitState::HalfOpen => {
                    inner.probe_in_flight = true;
                    (Some(Admission::Probe), false)
                }
            };
            match admission {
                Some(_) => inner.counters.total_calls += 1,
                None => inner.counters.total_rejections += 1,
            }
            (admission, probing)
        };

        if probing {
            tracing::info!(service = %self.service, from = "open", to = "half_open", "Circuit breaker probing");
        }
        admission
    }

    fn on_success(&self, admission: Admission) {
        let closed = {
            let mut inner = self.lock();
            inner.counters.total_successes += 1;
            if admission == Admission::Probe {
                inner.probe_in_flight = false;
            }
            match inner.state {
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    true
                }
                CircuitState::Closed => {
                    inner.failure_count = 0;
                    false
                }
                // Admitted before the breaker opened; the breaker stays open.
                CircuitState::Open => false,
            }
        };

        if closed {
            tracing::info!(service = %self.service, from = "half_open", to = "closed", "Circuit breaker closed");
        }
    }

    fn on_failure(&self, admission: Admission) {
        let now = self.clock.now();
        let opened_from = {
            let mut inner = self.lock();
            inner.counters.total_failures += 1;
            if admission == Admission::Probe {
                inner.probe_in_flight = false;
            }
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count += 1;
                    inner.last_failure_at = Some(now);
                    if inner.failure_count >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        inner.counters.times_opened += 1;
                        Some(CircuitState::Closed)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.last_failure_at = Some(now);
                    inner.counters.times_opened += 1;
                    Some(CircuitState::HalfOpen)
                }
                CircuitState::Open => {
                    inner.last_failure_at = Some(now);
                    None
                }
            }
        };

        if let Some(from) = opened_from {
            tracing::warn!(
                service = %self.service,
                from = %from,
                to = "open",
                threshold = self.config.failure_threshold,
                "Circuit breaker opened"
            );
        }
    }

    /// Forces the breaker back to closed with cleared counters.
    pub fn reset(&self) {
        {
            let mut inner = self.lock();
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.last_failure_at = None;
            inner.probe_in_flight = false;
        }
        tracing::info!(service = %self.service, "Circuit breaker reset");
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let inner = self.lock();
        let time_until_half_open = match (inner.state, inner.last_failure_at) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = Duration::from_secs_f64(now.secs_since(&at));
                Some(self.config.recovery_timeout.saturating_sub(elapsed))
            }
            _ => None,
        };
        BreakerSnapshot {
            service: self.service.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            last_failure_at: inner.last_failure_at,
            time_until_half_open,
            total_calls: inner.counters.total_calls,
            total_successes: inner.counters.total_successes,
            total_failures: inner.counters.total_failures,
            total_rejections: inner.counters.total_rejections,
            times_opened: inner.counters.times_opened,
        }
    }
}

/// Settles an admitted call exactly once, even if its future is dropped.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        if success {
            self.breaker.on_success(self.admission);
        } else {
            self.breaker.on_failure(self.admission);
        }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Probe {
            self.breaker.on_failure(self.admission);
        }
    }
}
