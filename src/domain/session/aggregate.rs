//! Session aggregate - one fact-collection dialogue and everything it gathered.
//!
//! # Invariants
//!
//! - a field with `confirmed_by_user = true` is only changed by a user statement
//!   or an answer to a clarifying question, never by extraction
//! - `turns` is append-only
//! - `missing_required_fields` is the set of required fields with no value
//! - `version` only grows; the session store bumps it on every successful update

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::domain::foundation::{ClientId, SessionId, StateMachine, Timestamp, ValidationError};

use super::compliance::ComplianceStatus;
use super::data_state::DataState;
use super::field::{
    CollectedField, ConfirmationReason, FieldSource, PendingConfirmation, RejectedExtraction,
};
use super::merge::{ConfidenceBands, ConfirmationAnswer, MergeOutcome};
use super::turn::Turn;

/// Default inactivity window before a session expires.
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// How many asked questions are remembered to avoid verbatim repeats.
pub const MAX_RECENT_QUESTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    owner_id: ClientId,
    created_at: Timestamp,
    last_active_at: Timestamp,
    ttl_seconds: u64,
    turns: Vec<Turn>,
    collected_fields: BTreeMap<String, CollectedField>,
    /// Required fields in the order they are asked for.
    required_fields: Vec<String>,
    missing_required_fields: BTreeSet<String>,
    pending_confirmations: Vec<PendingConfirmation>,
    rejected_extractions: Vec<RejectedExtraction>,
    recent_questions: VecDeque<String>,
    compliance: ComplianceStatus,
    exported_at: Option<Timestamp>,
    data_state: DataState,
    version: u64,
}

impl Session {
    /// Creates a session in `Initial` with every required field missing.
    pub fn new<I, S>(
        id: SessionId,
        owner_id: ClientId,
        required_fields: I,
        ttl_seconds: u64,
        now: Timestamp,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for field in required_fields {
            let field = field.into();
            if !ordered.contains(&field) {
                ordered.push(field);
            }
        }
        let missing = ordered.iter().cloned().collect();

        Self {
            id,
            owner_id,
            created_at: now,
            last_active_at: now,
            ttl_seconds,
            turns: Vec::new(),
            collected_fields: BTreeMap::new(),
            required_fields: ordered,
            missing_required_fields: missing,
            pending_confirmations: Vec::new(),
            rejected_extractions: Vec::new(),
            recent_questions: VecDeque::new(),
            compliance: ComplianceStatus::NotChecked,
            exported_at: None,
            data_state: DataState::Initial,
            version: 0,
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Accessors
    // ════════════════════════════════════════════════════════════════════════

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn owner_id(&self) -> &ClientId {
        &self.owner_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn last_active_at(&self) -> Timestamp {
        self.last_active_at
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The most recent `limit` turns, oldest first.
    pub fn history_window(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    pub fn collected_fields(&self) -> &BTreeMap<String, CollectedField> {
        &self.collected_fields
    }

    pub fn field(&self, name: &str) -> Option<&CollectedField> {
        self.collected_fields.get(name)
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required_fields.iter().any(|f| f == name)
    }

    pub fn missing_required_fields(&self) -> &BTreeSet<String> {
        &self.missing_required_fields
    }

    /// Missing required fields in asking order.
    pub fn missing_in_order(&self) -> Vec<&str> {
        self.required_fields
            .iter()
            .filter(|f| self.missing_required_fields.contains(*f))
            .map(String::as_str)
            .collect()
    }

    pub fn pending_confirmations(&self) -> &[PendingConfirmation] {
        &self.pending_confirmations
    }

    pub fn pending_for(&self, field: &str) -> Option<&PendingConfirmation> {
        self.pending_confirmations.iter().find(|p| p.field == field)
    }

    pub fn rejected_extractions(&self) -> &[RejectedExtraction] {
        &self.rejected_extractions
    }

    pub fn recent_questions(&self) -> impl Iterator<Item = &str> {
        self.recent_questions.iter().map(String::as_str)
    }

    pub fn compliance(&self) -> &ComplianceStatus {
        &self.compliance
    }

    pub fn exported_at(&self) -> Option<Timestamp> {
        self.exported_at
    }

    pub fn data_state(&self) -> DataState {
        self.data_state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    // ════════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ════════════════════════════════════════════════════════════════════════

    /// True when the session has been idle for longer than its TTL.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.data_state == DataState::Expired
            || now.secs_since(&self.last_active_at) > self.ttl_seconds as f64
    }

    /// Records activity at `now`.
    pub fn touch(&mut self, now: Timestamp) {
        if now.is_after(&self.last_active_at) {
            self.last_active_at = now;
        }
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Remembers a question that was asked, keeping only the last few.
    pub fn record_question(&mut self, question: impl Into<String>) {
        self.recent_questions.push_back(question.into());
        while self.recent_questions.len() > MAX_RECENT_QUESTIONS {
            self.recent_questions.pop_front();
        }
    }

    pub fn set_compliance(&mut self, status: ComplianceStatus) {
        self.compliance = status;
    }

    /// Completion over required fields, 0 to 100.
    pub fn completion_percentage(&self) -> u8 {
        let total = self.required_fields.len();
        if total == 0 {
            return 100;
        }
        let done = total - self.missing_required_fields.len();
        ((done * 100) / total) as u8
    }

    // ════════════════════════════════════════════════════════════════════════
    // Merge policy
    // ════════════════════════════════════════════════════════════════════════

    /// Stores a value the user stated, confirming it.
    ///
    /// Always wins: replaces any earlier value and clears a pending question
    /// for the field.
    pub fn record_user_value(
        &mut self,
        field: &str,
        value: impl Into<String>,
        source: FieldSource,
        now: Timestamp,
    ) {
        self.collected_fields
            .insert(field.to_string(), CollectedField::from_user(value, source, now));
        self.missing_required_fields.remove(field);
        self.pending_confirmations.retain(|p| p.field != field);
    }

    /// Applies one machine-extracted value under the merge policy.
    pub fn propose_extraction(
        &mut self,
        field: &str,
        value: &str,
        confidence: f64,
        bands: &ConfidenceBands,
        now: Timestamp,
    ) -> MergeOutcome {
        let value = value.trim();
        if value.is_empty() {
            return MergeOutcome::Discarded;
        }

        let existing = self.collected_fields.get(field).cloned();

        if let Some(existing) = &existing {
            if existing.confirmed_by_user {
                if existing.same_value(value) {
                    return MergeOutcome::Unchanged;
                }
                // The extractor re-reads the history window every turn.
                let already_recorded = self.rejected_extractions.iter().any(|r| {
                    r.field == field && r.kept == existing.value && r.proposed == value
                });
                if !already_recorded {
                    self.rejected_extractions.push(RejectedExtraction {
                        field: field.to_string(),
                        kept: existing.value.clone(),
                        proposed: value.to_string(),
                        confidence,
                        at: now,
                    });
                }
                return MergeOutcome::RejectedConfirmed {
                    kept: existing.value.clone(),
                    proposed: value.to_string(),
                };
            }
        }

        if confidence < bands.discard_below {
            return MergeOutcome::Discarded;
        }

        if confidence < bands.fill_at {
            let already_held = existing.as_ref().map_or(false, |e| e.same_value(value));
            if already_held || !self.is_required(field) {
                return MergeOutcome::Discarded;
            }
            self.raise_confirmation(field, value, confidence, ConfirmationReason::LowConfidence, now);
            return MergeOutcome::NeedsConfirmation;
        }

        match existing {
            None => {
                self.collected_fields
                    .insert(field.to_string(), CollectedField::extracted(value, confidence, now));
                self.missing_required_fields.remove(field);
                MergeOutcome::Filled
            }
            Some(existing) if existing.same_value(value) => {
                if let Some(stored) = self.collected_fields.get_mut(field) {
                    stored.confidence = stored.confidence.max(confidence.clamp(0.0, 1.0));
                }
                MergeOutcome::Unchanged
            }
            Some(existing) => {
                self.raise_confirmation(
                    field,
                    value,
                    confidence,
                    ConfirmationReason::Conflict {
                        existing: existing.value,
                    },
                    now,
                );
                MergeOutcome::NeedsConfirmation
            }
        }
    }

    fn raise_confirmation(
        &mut self,
        field: &str,
        proposed: &str,
        confidence: f64,
        reason: ConfirmationReason,
        now: Timestamp,
    ) {
        self.pending_confirmations.retain(|p| p.field != field);
        self.pending_confirmations.push(PendingConfirmation {
            field: field.to_string(),
            proposed: proposed.to_string(),
            confidence,
            reason,
            raised_at: now,
        });
    }

    /// Settles the pending question for `field`. Returns false if none was pending.
    pub fn resolve_confirmation(
        &mut self,
        field: &str,
        answer: ConfirmationAnswer,
        now: Timestamp,
    ) -> bool {
        let Some(index) = self.pending_confirmations.iter().position(|p| p.field == field) else {
            return false;
        };
        let pending = self.pending_confirmations.remove(index);

        match answer {
            ConfirmationAnswer::Accept => {
                self.record_user_value(field, pending.proposed, FieldSource::Confirmation, now);
            }
            ConfirmationAnswer::Reject => {
                if let ConfirmationReason::Conflict { .. } = pending.reason {
                    // Rejecting the newcomer vouches for the value already held.
                    if let Some(stored) = self.collected_fields.get_mut(field) {
                        stored.confirmed_by_user = true;
                        stored.source = FieldSource::Confirmation;
                        stored.updated_at = now;
                    }
                }
            }
            ConfirmationAnswer::Replace(value) => {
                self.record_user_value(field, value, FieldSource::UserStatement, now);
            }
        }
        true
    }

    // ════════════════════════════════════════════════════════════════════════
    // State transitions
    // ════════════════════════════════════════════════════════════════════════

    fn transition(&mut self, target: DataState) -> Result<(), ValidationError> {
        if target == self.data_state && !self.data_state.can_transition_to(&target) {
            return Ok(());
        }
        self.data_state = self.data_state.transition_to(target)?;
        Ok(())
    }

    /// Derives the data state from pending questions and missing fields.
    pub fn refresh_state(&mut self) -> Result<DataState, ValidationError> {
        if self.data_state == DataState::Expired {
            return Ok(self.data_state);
        }

        let target = if self.exported_at.is_some() {
            DataState::Exported
        } else if !self.pending_confirmations.is_empty() {
            DataState::AwaitingConfirmation
        } else if self.missing_required_fields.is_empty() {
            DataState::Complete
        } else {
            DataState::Collecting
        };

        if self.data_state == DataState::AwaitingConfirmation && target == DataState::Complete {
            self.transition(DataState::Collecting)?;
        }
        self.transition(target)?;
        Ok(self.data_state)
    }

    /// Marks the session exported. Returns false if it already was.
    pub fn mark_exported(&mut self, now: Timestamp) -> Result<bool, ValidationError> {
        if self.data_state == DataState::Exported {
            return Ok(false);
        }
        self.transition(DataState::Exported)?;
        self.exported_at = Some(now);
        Ok(true)
    }

    pub fn mark_expired(&mut self) {
        self.data_state = DataState::Expired;
    }

    /// Flags the last turn as failed. Expired sessions stay expired.
    pub fn mark_error(&mut self) {
        if self.data_state != DataState::Expired {
            self.data_state = DataState::Error;
        }
    }
}
