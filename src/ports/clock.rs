//! Clock port - the single source of "now" for time-dependent policies.
//!
//! Breaker recovery, bucket refill and session expiry all read time through
//! this trait so tests can drive them with a manual clock.

use crate::domain::foundation::Timestamp;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current moment.
    fn now(&self) -> Timestamp;
}
