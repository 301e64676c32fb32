//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the state machine trait and the error
//! vocabulary shared by every other layer of the orchestration core.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{ClientId, SessionId, MAX_CLIENT_ID_LENGTH};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
