//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the orchestration core to external systems:
//! - `clock` - Wall and manual clocks
//! - `resilience` - Circuit breakers, registry, degradation tracking
//! - `rate_limiter` - Token-bucket admission (in-memory, Redis, fallback)
//! - `session_store` - Session backends and the failover chain
//! - `ai` - Fact extraction collaborator
//! - `compliance` - Compliance collaborator

pub mod ai;
pub mod clock;
pub mod compliance;
pub mod rate_limiter;
pub mod resilience;
pub mod session_store;

pub use clock::{ManualClock, SystemClock};
