//! Circuit breaker vocabulary - states, configuration, snapshots and errors.
//!
//! The circuit breaker pattern prevents cascading failures when external
//! dependencies (model endpoint, compliance service, opportunity feed,
//! knowledge graph) become unavailable or slow.
//!
//! ## States
//!
//! - **Closed**: Normal operation, calls flow through
//! - **Open**: Too many failures, calls rejected immediately
//! - **Half-Open**: Exactly one probe call allowed to test recovery
//!
//! ## Transitions
//!
//! ```text
//! Closed --[failure_threshold consecutive failures]--> Open
//! Open --[recovery_timeout elapsed]--> Half-Open
//! Half-Open --[probe succeeds]--> Closed
//! Half-Open --[probe fails]--> Open
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::foundation::{StateMachine, Timestamp};

/// Circuit breaker states for external dependency protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls flow through to the dependency.
    Closed,

    /// Too many failures - calls rejected without touching the dependency.
    Open,

    /// Recovery window elapsed - a single probe call is in flight or allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{}", s)
    }
}

impl StateMachine for CircuitState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use CircuitState::*;
        matches!(
            (self, target),
            (Closed, Open) | (Open, HalfOpen) | (HalfOpen, Closed) | (HalfOpen, Open)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use CircuitState::*;
        match self {
            Closed => vec![Open],
            Open => vec![HalfOpen],
            HalfOpen => vec![Closed, Open],
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,

    /// Time to wait in Open before allowing a probe.
    pub recovery_timeout: Duration,

    /// Upper bound on a single guarded call. Exceeding it counts as a failure.
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a config with the given threshold and recovery timeout.
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            ..Self::default()
        }
    }

    /// Sets the per-call timeout.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Config for the language-model extraction endpoint.
    pub fn for_model_endpoint() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    /// Config for the compliance microservice.
    pub fn for_compliance() -> Self {
        Self::new(3, Duration::from_secs(60))
    }

    /// Config for the government opportunity feed.
    pub fn for_opportunity_feed() -> Self {
        Self::new(3, Duration::from_secs(120))
    }

    /// Config for the regulatory knowledge graph.
    pub fn for_knowledge_graph() -> Self {
        Self::new(3, Duration::from_secs(90))
    }
}

/// Point-in-time view of one breaker, used for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    /// Consecutive failures counted while closed.
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub last_failure_at: Option<Timestamp>,
    /// Time until a probe is allowed (only while open).
    pub time_until_half_open: Option<Duration>,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub times_opened: u64,
}

/// Outcome of a call made through a breaker.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without invoking the dependency.
    #[error("circuit breaker '{service}' is open")]
    Open { service: String },

    /// The call did not finish within the breaker's call timeout.
    #[error("call through '{service}' timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    /// The dependency itself returned an error.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// True when the dependency was never invoked.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// True when the call was abandoned because of its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// Returns the dependency error, if this is one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_state_follows_breaker_cycle() {
        assert!(CircuitState::Closed.can_transition_to(&CircuitState::Open));
        assert!(CircuitState::Open.can_transition_to(&CircuitState::HalfOpen));
        assert!(!CircuitState::Open.can_transition_to(&CircuitState::Closed));
        assert!(!CircuitState::Closed.can_transition_to(&CircuitState::HalfOpen));
        assert!(!CircuitState::Closed.is_terminal());
    }

    #[test]
    fn dependency_presets_match_operational_defaults() {
        assert_eq!(CircuitBreakerConfig::for_model_endpoint().failure_threshold, 5);
        assert_eq!(
            CircuitBreakerConfig::for_opportunity_feed().recovery_timeout,
            Duration::from_secs(120)
        );
        assert_eq!(
            CircuitBreakerConfig::for_knowledge_graph().recovery_timeout,
            Duration::from_secs(90)
        );
        assert_eq!(CircuitBreakerConfig::for_compliance().failure_threshold, 3);
    }

    #[test]
    fn breaker_error_open_displays_service() {
        let err: BreakerError<std::io::Error> = BreakerError::Open {
            service: "compliance".into(),
        };
        assert_eq!(format!("{}", err), "circuit breaker 'compliance' is open");
        assert!(err.is_open());
        assert!(!err.is_timeout());
    }
}
