//! Conversation turns.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the append-only conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub at: Timestamp,
}

impl Turn {
    pub fn user(content: impl Into<String>, at: Timestamp) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            at,
        }
    }

    pub fn assistant(content: impl Into<String>, at: Timestamp) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            at,
        }
    }
}
