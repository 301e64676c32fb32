//! Collected field values and the records kept around them.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// How a field value entered the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Proposed by the extraction collaborator.
    Extraction,
    /// Stated directly by the user.
    UserStatement,
    /// Accepted by the user in reply to a clarifying question.
    Confirmation,
}

/// One collected Basis of Estimate field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedField {
    pub value: String,
    pub confidence: f64,
    pub source: FieldSource,
    /// Set once a human stated or accepted the value; extraction never overwrites it.
    pub confirmed_by_user: bool,
    pub updated_at: Timestamp,
}

impl CollectedField {
    /// A value proposed by extraction, not yet confirmed.
    pub fn extracted(value: impl Into<String>, confidence: f64, at: Timestamp) -> Self {
        Self {
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source: FieldSource::Extraction,
            confirmed_by_user: false,
            updated_at: at,
        }
    }

    /// A value coming from the user, always confirmed.
    pub fn from_user(value: impl Into<String>, source: FieldSource, at: Timestamp) -> Self {
        Self {
            value: value.into(),
            confidence: 1.0,
            source,
            confirmed_by_user: true,
            updated_at: at,
        }
    }

    /// True when `other` denotes the same value, ignoring case and surrounding space.
    pub fn same_value(&self, other: &str) -> bool {
        normalize(&self.value) == normalize(other)
    }
}

pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Why a proposed value is waiting on the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationReason {
    /// Extraction confidence fell between the discard and fill thresholds.
    LowConfidence,
    /// Extraction disagrees with an unconfirmed value already held.
    Conflict { existing: String },
}

/// A proposed value the user has been asked to confirm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub field: String,
    pub proposed: String,
    pub confidence: f64,
    pub reason: ConfirmationReason,
    pub raised_at: Timestamp,
}

/// An extraction discarded because the field was already confirmed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedExtraction {
    pub field: String,
    pub kept: String,
    pub proposed: String,
    pub confidence: f64,
    pub at: Timestamp,
}
