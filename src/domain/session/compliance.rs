//! Outcome of the compliance check attached to a completed session.

use serde::{Deserialize, Serialize};

/// Result of asking the compliance collaborator about the collected fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComplianceStatus {
    #[default]
    NotChecked,
    Passed,
    Failed { findings: Vec<String> },
    /// The check could not run (breaker open, timeout, collaborator error).
    Skipped { reason: String },
}

impl ComplianceStatus {
    /// True once a check has produced a verdict.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed { .. })
    }
}
