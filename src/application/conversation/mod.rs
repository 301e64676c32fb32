//! Turn orchestration for the fact-collection dialogue.

mod handler;
mod headers;
mod types;

pub use handler::ConversationStateMachine;
pub use headers::{names as header_names, rate_limit_headers};
pub use types::{
    ConversationSettings, ExportSnapshot, NextAction, SessionSnapshot, TurnError, TurnOutcome,
    TurnRequest,
};
