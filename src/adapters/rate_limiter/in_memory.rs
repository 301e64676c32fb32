//! In-memory token bucket rate limiter.
//!
//! Serves as the per-instance fallback behind the shared store and as the
//! only limiter in single-process deployments and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::admission::{BucketPolicy, TokenBucket};
use crate::domain::foundation::{ClientId, ValidationError};
use crate::ports::{Clock, RateLimitDecision, RateLimitError, RateLimitStatus, RateLimiter};

use super::config::RateLimitConfig;

/// Token buckets kept in process memory, keyed by client.
pub struct InMemoryRateLimiter {
    policy: BucketPolicy,
    idle_expiry: Duration,
    clock: Arc<dyn Clock>,
    buckets: Arc<RwLock<HashMap<ClientId, TokenBucket>>>,
}

impl InMemoryRateLimiter {
    pub fn new(policy: BucketPolicy, idle_expiry: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            idle_expiry,
            clock,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, ValidationError> {
        Ok(Self::new(config.policy()?, config.idle_expiry(), clock))
    }

    pub fn policy(&self) -> &BucketPolicy {
        &self.policy
    }

    /// Drops buckets idle for longer than the idle window. Returns how many went.
    pub async fn sweep_idle(&self) -> usize {
        let now = self.clock.now();
        let idle = self.idle_expiry.as_secs_f64();
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| now.secs_since(&bucket.last_refill()) < idle);
        before - buckets.len()
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, client: &ClientId) -> Result<RateLimitDecision, RateLimitError> {
        let now = self.clock.now();
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry(client.clone())
            .or_insert_with(|| TokenBucket::full(&self.policy, now));

        let outcome = bucket.try_take(&self.policy, now);
        let capacity = self.policy.capacity();
        Ok(if outcome.allowed {
            RateLimitDecision::allowed(capacity, outcome.remaining)
        } else {
            RateLimitDecision::denied(capacity, outcome.retry_after)
        })
    }

    async fn status(&self, client: &ClientId) -> Result<RateLimitStatus, RateLimitError> {
        let now = self.clock.now();
        let buckets = self.buckets.read().await;
        let remaining = buckets
            .get(client)
            .map_or(self.policy.capacity(), |b| b.peek(&self.policy, now));
        Ok(RateLimitStatus {
            limit: self.policy.capacity(),
            remaining,
        })
    }

    async fn reset(&self, client: &ClientId) -> Result<(), RateLimitError> {
        self.buckets.write().await.remove(client);
        Ok(())
    }
}
