//! Token bucket arithmetic shared by every rate limiter backend.
//!
//! A bucket refills continuously at `refill_per_sec` up to `capacity`; each
//! admitted request takes one token.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::foundation::{Timestamp, ValidationError};

/// Slack for float drift when comparing against one whole token.
const EPSILON: f64 = 1e-9;

/// Shape of every bucket: capacity and refill speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketPolicy {
    capacity: u32,
    refill_per_sec: f64,
}

impl BucketPolicy {
    /// Creates a policy. Both values must be positive.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Result<Self, ValidationError> {
        if capacity == 0 {
            return Err(ValidationError::out_of_range(
                "capacity",
                1.0,
                f64::from(u32::MAX),
                0.0,
            ));
        }
        if !refill_per_sec.is_finite() || refill_per_sec <= 0.0 {
            return Err(ValidationError::invalid_format(
                "refill_per_sec",
                "must be a positive number",
            ));
        }
        Ok(Self {
            capacity,
            refill_per_sec,
        })
    }

    /// Policy refilling `per_minute` tokens every minute.
    pub fn per_minute(capacity: u32, per_minute: u32) -> Result<Self, ValidationError> {
        Self::new(capacity, f64::from(per_minute) / 60.0)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }

    /// Time needed to go from `tokens` to one whole token, rounded up to the millisecond.
    pub fn time_to_next_token(&self, tokens: f64) -> Duration {
        let deficit = (1.0 - tokens).max(0.0);
        let millis = (deficit / self.refill_per_sec * 1000.0).ceil();
        Duration::from_millis(millis as u64)
    }
}

/// Outcome of asking a bucket for a token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketOutcome {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Duration,
}

/// One client's bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Timestamp,
}

impl TokenBucket {
    /// A full bucket as of `now`.
    pub fn full(policy: &BucketPolicy, now: Timestamp) -> Self {
        Self {
            tokens: f64::from(policy.capacity),
            last_refill: now,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Timestamp {
        self.last_refill
    }

    /// Adds the tokens earned since the last refill, capped at capacity.
    pub fn refill(&mut self, policy: &BucketPolicy, now: Timestamp) {
        if now.is_after(&self.last_refill) {
            let elapsed = now.secs_since(&self.last_refill);
            self.tokens = (self.tokens + elapsed * policy.refill_per_sec)
                .min(f64::from(policy.capacity));
            self.last_refill = now;
        }
    }

    /// Refills, then takes one token if available.
    pub fn try_take(&mut self, policy: &BucketPolicy, now: Timestamp) -> BucketOutcome {
        self.refill(policy, now);
        if self.tokens + EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            BucketOutcome {
                allowed: true,
                remaining: self.whole_tokens(),
                retry_after: Duration::ZERO,
            }
        } else {
            BucketOutcome {
                allowed: false,
                remaining: 0,
                retry_after: policy.time_to_next_token(self.tokens),
            }
        }
    }

    /// Whole tokens available at `now` without consuming any.
    pub fn peek(&self, policy: &BucketPolicy, now: Timestamp) -> u32 {
        let mut copy = *self;
        copy.refill(policy, now);
        copy.whole_tokens()
    }

    fn whole_tokens(&self) -> u32 {
        (self.tokens + EPSILON).floor().max(0.0) as u32
    }
}
