//! Session module - the durable record of one fact-collection dialogue.

mod aggregate;
mod compliance;
mod data_state;
mod field;
mod merge;
mod turn;

pub use aggregate::{Session, DEFAULT_TTL_SECONDS, MAX_RECENT_QUESTIONS};
pub use compliance::ComplianceStatus;
pub use data_state::DataState;
pub use field::{
    CollectedField, ConfirmationReason, FieldSource, PendingConfirmation, RejectedExtraction,
};
pub use merge::{ConfidenceBands, ConfirmationAnswer, MergeOutcome};
pub use turn::{Role, Turn};
