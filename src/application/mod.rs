//! Application layer - turn orchestration and health reporting.
//!
//! This layer coordinates the domain with the ports: admission, session
//! storage and the guarded collaborator calls of one conversational turn.

pub mod conversation;
pub mod health;

pub use conversation::{
    ConversationSettings, ConversationStateMachine, ExportSnapshot, NextAction, SessionSnapshot,
    TurnError, TurnOutcome, TurnRequest,
};
pub use health::SystemHealth;
