//! Resilience adapters: circuit breakers, their registry, and cool-down
//! tracking for fallback chains.

mod circuit_breaker;
mod degradation;
mod registry;

pub use circuit_breaker::CircuitBreaker;
pub use degradation::DegradationTracker;
pub use registry::{BreakerHealth, CircuitBreakerRegistry, Dependency};
