//! Two-tier rate limiter: shared store first, local buckets when it fails.
//!
//! The shared tier is not wrapped by a business circuit breaker. A failed or
//! slow call falls back immediately and starts a cool-down during which the
//! shared tier is skipped. While on the fallback, limits are per instance
//! only; every such decision carries `degraded = true` and is counted.
//!
//! # Example
//!
//! ```ignore
//! let limiter = FallbackRateLimiter::new(redis_limiter, in_memory_limiter, &config, clock);
//! let decision = limiter.check(&client_id).await?;
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::resilience::DegradationTracker;
use crate::domain::foundation::ClientId;
use crate::ports::{
    Clock, RateLimitDecision, RateLimitError, RateLimitStatus, RateLimiter, RateLimiterHealth,
};

use super::config::RateLimitConfig;
use super::in_memory::InMemoryRateLimiter;

pub struct FallbackRateLimiter<P, F = InMemoryRateLimiter> {
    primary: P,
    fallback: F,
    primary_timeout: Duration,
    tracker: DegradationTracker,
    on_fallback: AtomicBool,
    fallback_activations: AtomicU64,
}

impl<P, F> FallbackRateLimiter<P, F>
where
    P: RateLimiter,
    F: RateLimiter,
{
    pub fn new(primary: P, fallback: F, config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            primary,
            fallback,
            primary_timeout: config.primary_timeout(),
            tracker: DegradationTracker::new(1, config.primary_cool_down(), clock),
            on_fallback: AtomicBool::new(false),
            fallback_activations: AtomicU64::new(0),
        }
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    /// Runs `call` against the primary unless it is cooling down.
    /// `None` means the fallback has to answer.
    async fn try_primary<T, Fut>(&self, op: &'static str, call: Fut) -> Option<T>
    where
        Fut: Future<Output = Result<T, RateLimitError>>,
    {
        if self.tracker.is_degraded() {
            return None;
        }

        let error = match tokio::time::timeout(self.primary_timeout, call).await {
            Ok(Ok(value)) => {
                self.tracker.record_success();
                if self.on_fallback.swap(false, Ordering::Relaxed) {
                    tracing::info!(op, "Shared rate limit store recovered");
                }
                return Some(value);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.primary_timeout),
        };

        self.tracker.record_failure();
        if !self.on_fallback.swap(true, Ordering::Relaxed) {
            self.fallback_activations.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                op,
                error = %error,
                "Shared rate limit store failed, limiting per instance"
            );
        }
        None
    }
}

#[async_trait]
impl<P, F> RateLimiter for FallbackRateLimiter<P, F>
where
    P: RateLimiter,
    F: RateLimiter,
{
    async fn check(&self, client: &ClientId) -> Result<RateLimitDecision, RateLimitError> {
        if let Some(decision) = self.try_primary("check", self.primary.check(client)).await {
            return Ok(decision);
        }
        Ok(self.fallback.check(client).await?.degraded())
    }

    async fn status(&self, client: &ClientId) -> Result<RateLimitStatus, RateLimitError> {
        if let Some(status) = self.try_primary("status", self.primary.status(client)).await {
            return Ok(status);
        }
        self.fallback.status(client).await
    }

    async fn reset(&self, client: &ClientId) -> Result<(), RateLimitError> {
        let local = self.fallback.reset(client).await;
        match self.try_primary("reset", self.primary.reset(client)).await {
            Some(()) => local,
            None => Err(RateLimitError::Unavailable(
                "shared rate limit store unreachable; only the local bucket was reset".into(),
            )),
        }
    }

    fn health(&self) -> RateLimiterHealth {
        RateLimiterHealth {
            degraded: self.on_fallback.load(Ordering::Relaxed) || self.tracker.is_degraded(),
            fallback_activations: self.fallback_activations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::domain::admission::BucketPolicy;
    use std::sync::atomic::AtomicU32;

    /// Shared-store stand-in that can be switched off.
    struct SwitchableLimiter {
        inner: InMemoryRateLimiter,
        down: AtomicBool,
        calls: AtomicU32,
    }

    impl SwitchableLimiter {
        fn new(clock: Arc<ManualClock>) -> Self {
            Self {
                inner: InMemoryRateLimiter::new(
                    BucketPolicy::per_minute(3, 3).unwrap(),
                    Duration::from_secs(600),
                    clock,
                ),
                down: AtomicBool::new(false),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RateLimiter for Arc<SwitchableLimiter> {
        async fn check(&self, client: &ClientId) -> Result<RateLimitDecision, RateLimitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(RateLimitError::Unavailable("connection refused".into()));
            }
            self.inner.check(client).await
        }

        async fn status(&self, client: &ClientId) -> Result<RateLimitStatus, RateLimitError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(RateLimitError::Unavailable("connection refused".into()));
            }
            self.inner.status(client).await
        }

        async fn reset(&self, client: &ClientId) -> Result<(), RateLimitError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(RateLimitError::Unavailable("connection refused".into()));
            }
            self.inner.reset(client).await
        }
    }

    fn setup() -> (
        FallbackRateLimiter<Arc<SwitchableLimiter>>,
        Arc<SwitchableLimiter>,
        Arc<ManualClock>,
    ) {
        let clock = Arc::new(ManualClock::default());
        let primary = Arc::new(SwitchableLimiter::new(clock.clone()));
        let fallback = InMemoryRateLimiter::new(
            BucketPolicy::per_minute(3, 3).unwrap(),
            Duration::from_secs(600),
            clock.clone(),
        );
        let config = RateLimitConfig {
            primary_cool_down_secs: 30,
            ..Default::default()
        };
        let limiter = FallbackRateLimiter::new(primary.clone(), fallback, &config, clock.clone());
        (limiter, primary, clock)
    }

    fn client() -> ClientId {
        ClientId::new("client").unwrap()
    }

    #[tokio::test]
    async fn healthy_primary_answers() {
        let (limiter, primary, _) = setup();
        let decision = limiter.check(&client()).await.unwrap();

        assert!(decision.allowed);
        assert!(!decision.degraded);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.health(), RateLimiterHealth::default());
    }

    #[tokio::test]
    async fn primary_failure_falls_back_instead_of_rejecting() {
        let (limiter, primary, _) = setup();
        primary.down.store(true, Ordering::SeqCst);

        let decision = limiter.check(&client()).await.unwrap();

        assert!(decision.allowed);
        assert!(decision.degraded);
        let health = limiter.health();
        assert!(health.degraded);
        assert_eq!(health.fallback_activations, 1);
    }

    #[tokio::test]
    async fn fallback_still_enforces_limits() {
        let (limiter, primary, _) = setup();
        primary.down.store(true, Ordering::SeqCst);

        for _ in 0..3 {
            assert!(limiter.check(&client()).await.unwrap().allowed);
        }
        let denied = limiter.check(&client()).await.unwrap();
        assert!(!denied.allowed);
        assert!(denied.degraded);
    }

    #[tokio::test]
    async fn primary_is_skipped_during_cool_down() {
        let (limiter, primary, clock) = setup();
        primary.down.store(true, Ordering::SeqCst);
        limiter.check(&client()).await.unwrap();
        primary.down.store(false, Ordering::SeqCst);

        limiter.check(&client()).await.unwrap();
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(30));
        let decision = limiter.check(&client()).await.unwrap();

        assert!(!decision.degraded);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert!(!limiter.health().degraded);
        assert_eq!(limiter.health().fallback_activations, 1);
    }

    #[tokio::test]
    async fn activations_count_switches_not_decisions() {
        let (limiter, primary, clock) = setup();
        primary.down.store(true, Ordering::SeqCst);
        for _ in 0..3 {
            assert!(limiter.check(&client()).await.unwrap().degraded);
        }
        assert_eq!(limiter.health().fallback_activations, 1);

        primary.down.store(false, Ordering::SeqCst);
        clock.advance(Duration::from_secs(30));
        assert!(!limiter.check(&client()).await.unwrap().degraded);

        primary.down.store(true, Ordering::SeqCst);
        limiter.check(&client()).await.unwrap();
        assert_eq!(limiter.health().fallback_activations, 2);
    }
}
