//! Rate limit configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::admission::BucketPolicy;
use crate::domain::foundation::ValidationError;

/// Token bucket shape plus the behaviour of the shared-store tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum burst per client.
    pub capacity: u32,
    /// Tokens added per minute.
    pub refill_per_minute: u32,
    /// Buckets untouched this long are dropped.
    pub idle_expiry_secs: u64,
    /// Upper bound on one shared-store round trip.
    pub primary_timeout_ms: u64,
    /// How long to stay on the local fallback after the shared store fails.
    pub primary_cool_down_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_per_minute: 100,
            idle_expiry_secs: 600,
            primary_timeout_ms: 250,
            primary_cool_down_secs: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn policy(&self) -> Result<BucketPolicy, ValidationError> {
        BucketPolicy::per_minute(self.capacity, self.refill_per_minute)
    }

    pub fn idle_expiry(&self) -> Duration {
        Duration::from_secs(self.idle_expiry_secs)
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }

    pub fn primary_cool_down(&self) -> Duration {
        Duration::from_secs(self.primary_cool_down_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.policy()?;
        if self.primary_timeout_ms == 0 {
            return Err(ValidationError::invalid_format(
                "primary_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_one_hundred_per_minute() {
        let config = RateLimitConfig::default();
        let policy = config.policy().unwrap();
        assert_eq!(policy.capacity(), 100);
        assert!((policy.refill_per_sec() - 100.0 / 60.0).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_refill_is_invalid() {
        let config = RateLimitConfig {
            refill_per_minute: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
