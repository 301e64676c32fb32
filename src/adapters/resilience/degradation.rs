//! Cool-down tracking for infrastructure that falls back instead of failing.
//!
//! After `degrade_after` consecutive failures a resource is skipped for
//! `cool_down`; the first call after the window tries it again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::foundation::Timestamp;
use crate::ports::Clock;

#[derive(Debug, Default)]
struct DegradationState {
    consecutive_failures: u32,
    degraded_until: Option<Timestamp>,
}

/// Tracks whether a resource should be skipped for a while.
pub struct DegradationTracker {
    degrade_after: u32,
    cool_down: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<DegradationState>,
}

impl DegradationTracker {
    pub fn new(degrade_after: u32, cool_down: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            degrade_after: degrade_after.max(1),
            cool_down,
            clock,
            state: Mutex::new(DegradationState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DegradationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while inside a cool-down window.
    pub fn is_degraded(&self) -> bool {
        let now = self.clock.now();
        self.lock()
            .degraded_until
            .map_or(false, |until| now.is_before(&until))
    }

    /// Clears the failure streak.
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = 0;
        state.degraded_until = None;
    }

    /// Counts a failure. Returns true if this failure started a cool-down.
    pub fn record_failure(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.degrade_after {
            state.consecutive_failures = 0;
            state.degraded_until = Some(now.plus(self.cool_down));
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;

    fn tracker(after: u32) -> (DegradationTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (
            DegradationTracker::new(after, Duration::from_secs(30), clock.clone()),
            clock,
        )
    }

    #[test]
    fn degrades_after_repeated_failures() {
        let (t, _) = tracker(3);
        assert!(!t.record_failure());
        assert!(!t.record_failure());
        assert!(!t.is_degraded());

        assert!(t.record_failure());
        assert!(t.is_degraded());
    }

    #[test]
    fn success_breaks_the_streak() {
        let (t, _) = tracker(2);
        t.record_failure();
        t.record_success();
        assert!(!t.record_failure());
        assert!(!t.is_degraded());
    }

    #[test]
    fn cool_down_expires() {
        let (t, clock) = tracker(1);
        t.record_failure();
        assert!(t.is_degraded());

        clock.advance(Duration::from_secs(30));
        assert!(!t.is_degraded());
    }
}
