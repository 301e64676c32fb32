//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the orchestration core and the outside world. Adapters implement these ports.
//!
//! ## Resilience
//!
//! - `Clock` - Source of "now" for every time-dependent policy
//! - `CircuitState` / `CircuitBreakerConfig` / `BreakerError` - Breaker vocabulary
//! - `RateLimiter` - Per-client token-bucket admission
//!
//! ## Storage
//!
//! - `SessionBackend` - One tier of the session failover chain
//!
//! ## Collaborators
//!
//! - `FactExtractor` - Model endpoint proposing field values
//! - `ComplianceChecker` - Compliance microservice

mod circuit_breaker;
mod clock;
mod compliance_checker;
mod fact_extractor;
mod rate_limiter;
mod session_backend;

pub use circuit_breaker::{BreakerError, BreakerSnapshot, CircuitBreakerConfig, CircuitState};
pub use clock::Clock;
pub use compliance_checker::{
    ComplianceChecker, ComplianceError, ComplianceReport, ComplianceRequest,
};
pub use fact_extractor::{
    ExtractedField, ExtractionError, ExtractionRequest, ExtractionResult, FactExtractor,
};
pub use rate_limiter::{
    bucket_key, RateLimitDecision, RateLimitError, RateLimitStatus, RateLimiter,
    RateLimiterHealth,
};
pub use session_backend::{BackendError, SessionBackend, SessionStoreError, WriteCondition};
