//! Merge policy vocabulary: confidence bands and per-field outcomes.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Confidence thresholds that decide what an extracted value does.
///
/// - `confidence >= fill_at`: fills the field
/// - `discard_below <= confidence < fill_at`: asks the user (required fields only)
/// - `confidence < discard_below`: ignored
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBands {
    pub fill_at: f64,
    pub discard_below: f64,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            fill_at: 0.7,
            discard_below: 0.3,
        }
    }
}

impl ConfidenceBands {
    /// Creates bands, rejecting thresholds outside `0..=1` or out of order.
    pub fn new(fill_at: f64, discard_below: f64) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&fill_at) {
            return Err(ValidationError::out_of_range("fill_at", 0.0, 1.0, fill_at));
        }
        if !(0.0..=fill_at).contains(&discard_below) {
            return Err(ValidationError::out_of_range(
                "discard_below",
                0.0,
                fill_at,
                discard_below,
            ));
        }
        Ok(Self {
            fill_at,
            discard_below,
        })
    }
}

/// What happened to one extracted field.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The value was stored (new, or replacing an equal unconfirmed value).
    Filled,
    /// The stored value already matched.
    Unchanged,
    /// The field is confirmed by the user; the proposal was recorded and dropped.
    RejectedConfirmed { kept: String, proposed: String },
    /// The user has to decide.
    NeedsConfirmation,
    /// Confidence too low to act on.
    Discarded,
}

/// The user's reply to a clarifying question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationAnswer {
    /// Take the proposed value.
    Accept,
    /// Drop the proposed value.
    Reject,
    /// Use this value instead.
    Replace(String),
}
