//! Operational health of the orchestration core.

use serde::Serialize;

use crate::adapters::resilience::{BreakerHealth, CircuitBreakerRegistry};
use crate::adapters::session_store::{BackendStatus, SessionStore};
use crate::ports::{RateLimiter, RateLimiterHealth};

/// Breakers, admission and storage in one report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub breakers: BreakerHealth,
    pub rate_limiter: RateLimiterHealth,
    pub session_backends: Vec<BackendStatus>,
}

impl SystemHealth {
    pub fn collect(
        breakers: &CircuitBreakerRegistry,
        limiter: &dyn RateLimiter,
        store: &SessionStore,
    ) -> Self {
        Self {
            breakers: breakers.health(),
            rate_limiter: limiter.health(),
            session_backends: store.backend_status(),
        }
    }

    /// True if any part runs on a fallback.
    pub fn is_degraded(&self) -> bool {
        self.breakers.is_degraded()
            || self.rate_limiter.degraded
            || self.session_backends.iter().any(|b| b.degraded)
    }

    /// Logs the report: `warn` when degraded, `debug` otherwise.
    pub fn log(&self) {
        if self.is_degraded() {
            tracing::warn!(
                open_breakers = ?self.breakers.open,
                half_open_breakers = ?self.breakers.half_open,
                rate_limiter_degraded = self.rate_limiter.degraded,
                fallback_activations = self.rate_limiter.fallback_activations,
                degraded_backends = ?self
                    .session_backends
                    .iter()
                    .filter(|b| b.degraded)
                    .map(|b| b.name.as_str())
                    .collect::<Vec<_>>(),
                "System running degraded"
            );
        } else {
            tracing::debug!(
                breakers = self.breakers.breakers.len(),
                fallback_activations = self.rate_limiter.fallback_activations,
                "System healthy"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::rate_limiter::InMemoryRateLimiter;
    use crate::adapters::session_store::{InMemorySessionBackend, SessionStoreOptions};
    use crate::domain::admission::BucketPolicy;
    use crate::ports::{Clock, SessionBackend};
    use std::sync::Arc;
    use std::time::Duration;

    fn parts() -> (CircuitBreakerRegistry, InMemoryRateLimiter, SessionStore) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let registry = CircuitBreakerRegistry::new(clock.clone());
        let limiter = InMemoryRateLimiter::new(
            BucketPolicy::new(10, 1.0).unwrap(),
            Duration::from_secs(60),
            clock.clone(),
        );
        let store = SessionStore::new(
            vec![Arc::new(InMemorySessionBackend::new()) as Arc<dyn SessionBackend>],
            SessionStoreOptions::default(),
            clock,
        );
        (registry, limiter, store)
    }

    #[test]
    fn fresh_system_is_healthy() {
        let (registry, limiter, store) = parts();
        let health = SystemHealth::collect(&registry, &limiter, &store);

        assert!(!health.is_degraded());
        assert_eq!(health.session_backends.len(), 1);
        assert_eq!(health.session_backends[0].name, "memory");
        assert!(health.breakers.breakers.contains_key("model_endpoint"));
    }

    #[tokio::test]
    async fn open_breaker_degrades_the_report() {
        let (registry, limiter, store) = parts();
        let breaker = registry.breaker("compliance");
        for _ in 0..breaker.config().failure_threshold {
            let _ = breaker.execute(|| async { Err::<(), _>("down") }).await;
        }

        let health = SystemHealth::collect(&registry, &limiter, &store);
        assert!(health.is_degraded());
        assert_eq!(health.breakers.open, vec!["compliance".to_string()]);
    }
}
