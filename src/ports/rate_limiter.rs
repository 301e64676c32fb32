//! Rate limiting port for per-client admission control.
//!
//! This port defines the interface for token-bucket admission. Implementations
//! keep buckets in process memory or in a shared counter store; a fallback
//! wrapper combines the two.

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::domain::foundation::ClientId;

/// Port for rate limiting operations.
///
/// Implementations should be thread-safe and support concurrent access.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check if a request is admitted, consuming a token if so.
    async fn check(&self, client: &ClientId) -> Result<RateLimitDecision, RateLimitError>;

    /// Get current bucket status without consuming a token.
    async fn status(&self, client: &ClientId) -> Result<RateLimitStatus, RateLimitError>;

    /// Reset the bucket for a client (admin operation), restoring full capacity.
    async fn reset(&self, client: &ClientId) -> Result<(), RateLimitError>;

    /// Operational view of this limiter.
    fn health(&self) -> RateLimiterHealth {
        RateLimiterHealth::default()
    }
}

/// Returns the shared-store key for a client's bucket.
///
/// The client identifier is hashed so raw API keys never reach the store.
pub fn bucket_key(client: &ClientId) -> String {
    let digest = Sha256::digest(client.as_str().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("ratelimit:{}", hex)
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Bucket capacity.
    pub limit: u32,
    /// Whole tokens left after this check.
    pub remaining: u32,
    /// Time until one token is available. Zero when allowed.
    pub retry_after: Duration,
    /// True when the decision came from a per-instance fallback bucket.
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Creates an admitted decision.
    pub fn allowed(limit: u32, remaining: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after: Duration::ZERO,
            degraded: false,
        }
    }

    /// Creates a denied decision.
    pub fn denied(limit: u32, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after,
            degraded: false,
        }
    }

    /// Marks the decision as produced in degraded mode.
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    /// Retry-after rounded up to whole seconds, at least one when denied.
    pub fn retry_after_secs(&self) -> u64 {
        if self.allowed {
            return 0;
        }
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 || secs == 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Current bucket status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
}

/// Degraded-mode view of a limiter for health reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateLimiterHealth {
    /// True while admission is served by the per-instance fallback.
    pub degraded: bool,
    /// How many times admission switched to the fallback since start.
    pub fallback_activations: u64,
}

/// Errors that can occur during rate limiting operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Rate limiter backend is unavailable.
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),

    /// Invalid rate limit key provided.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_key_hides_client_identifier() {
        let client = ClientId::new("sk-live-secret").unwrap();
        let key = bucket_key(&client);

        assert!(key.starts_with("ratelimit:"));
        assert!(!key.contains("sk-live-secret"));
        assert_eq!(key.len(), "ratelimit:".len() + 64);
    }

    #[test]
    fn bucket_key_is_stable_per_client() {
        let a = ClientId::new("client-a").unwrap();
        let b = ClientId::new("client-b").unwrap();

        assert_eq!(bucket_key(&a), bucket_key(&a.clone()));
        assert_ne!(bucket_key(&a), bucket_key(&b));
    }

    #[test]
    fn retry_after_secs_rounds_up() {
        let decision = RateLimitDecision::denied(100, Duration::from_millis(600));
        assert_eq!(decision.retry_after_secs(), 1);

        let decision = RateLimitDecision::denied(100, Duration::from_millis(2001));
        assert_eq!(decision.retry_after_secs(), 3);

        let decision = RateLimitDecision::allowed(100, 5);
        assert_eq!(decision.retry_after_secs(), 0);
    }

    #[test]
    fn degraded_marks_decision() {
        let decision = RateLimitDecision::allowed(10, 9).degraded();
        assert!(decision.degraded);
        assert!(decision.allowed);
    }
}
