//! Conversation state machine - handles one inbound turn end to end.
//!
//! A turn passes admission, loads (or starts) the session, runs the
//! extraction collaborator through its breaker, merges the result under the
//! merge policy and persists through the session store's optimistic update.
//! Every dependency failure has a fallback: an open extractor breaker asks
//! the user directly, an open compliance breaker records the check as
//! skipped, and an exhausted store answers with `RetryLater`.

use http::HeaderMap;
use std::sync::Arc;

use crate::adapters::resilience::{CircuitBreakerRegistry, Dependency};
use crate::adapters::session_store::SessionStore;
use crate::domain::conversation::{
    confirmation_question, is_known_field, next_question, parse_confirmation_reply, Question,
    UserInput,
};
use crate::domain::foundation::{ClientId, SessionId, Timestamp};
use crate::domain::session::{
    ComplianceStatus, ConfidenceBands, ConfirmationAnswer, DataState, FieldSource, MergeOutcome,
    Session, Turn,
};
use crate::ports::{
    bucket_key, BreakerError, Clock, ComplianceChecker, ComplianceError, ComplianceRequest,
    ExtractedField, ExtractionError, ExtractionRequest, FactExtractor, RateLimiter,
    SessionStoreError,
};

use super::headers::rate_limit_headers;
use super::types::{
    ConversationSettings, ExportSnapshot, NextAction, SessionSnapshot, TurnError, TurnOutcome,
    TurnRequest,
};

const STORAGE_RETRY_REPLY: &str =
    "I couldn't save that just now. Please send the same message again in a moment.";

/// What a turn will do to the session, decided before the write.
#[derive(Debug, Clone)]
enum TurnPlan {
    /// Keep the message in history only.
    Record,
    Merge(Vec<ExtractedField>),
    Reply {
        field: String,
        answer: ConfirmationAnswer,
    },
    State {
        field: String,
        value: String,
    },
}

impl TurnPlan {
    fn changes_fields(&self) -> bool {
        !matches!(self, TurnPlan::Record)
    }
}

#[derive(Debug, Clone)]
struct Decision {
    action: NextAction,
    question: Option<Question>,
    reply: String,
}

pub struct ConversationStateMachine {
    limiter: Arc<dyn RateLimiter>,
    store: Arc<SessionStore>,
    breakers: Arc<CircuitBreakerRegistry>,
    extractor: Arc<dyn FactExtractor>,
    compliance: Arc<dyn ComplianceChecker>,
    clock: Arc<dyn Clock>,
    settings: ConversationSettings,
}

impl ConversationStateMachine {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        store: Arc<SessionStore>,
        breakers: Arc<CircuitBreakerRegistry>,
        extractor: Arc<dyn FactExtractor>,
        compliance: Arc<dyn ComplianceChecker>,
        clock: Arc<dyn Clock>,
        settings: ConversationSettings,
    ) -> Self {
        Self {
            limiter,
            store,
            breakers,
            extractor,
            compliance,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ConversationSettings {
        &self.settings
    }

    /// Handles one turn.
    ///
    /// # Errors
    ///
    /// Only failures without a fallback are returned: admission denial,
    /// unknown or expired sessions, exhausted concurrency retries, invalid
    /// input, and exports of incomplete sessions.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnOutcome, TurnError> {
        request
            .input
            .validate()
            .map_err(|e| TurnError::InvalidInput(e.to_string()))?;

        let headers = self.admit(&request.client_id).await?;
        let session = self.open_session(&request).await?;

        if let UserInput::Export = request.input {
            let (session, export) = self.export_session(session).await?;
            return Ok(TurnOutcome {
                session_id: session.id(),
                action: NextAction::Exported,
                question: None,
                reply: "The estimate has been exported.".to_string(),
                snapshot: SessionSnapshot::from(&session),
                export: Some(export),
                headers,
                degraded: None,
            });
        }

        let (plan, degraded) = self.plan(&session, &request.input).await?;
        let user_text = user_turn_text(&request.input);
        let now = self.clock.now();
        let bands = self.settings.bands;

        let mut decided = None;
        let written = self
            .store
            .update(&session.id(), |s| {
                decided = Some(apply_plan(s, &plan, &user_text, &bands, now)?);
                Ok(())
            })
            .await;

        let mut updated = match written {
            Ok(updated) => updated,
            Err(SessionStoreError::BackendUnavailable(reason)) => {
                tracing::error!(session_id = %session.id(), reason = %reason, "Turn could not be persisted");
                return Ok(storage_failure_outcome(session, headers, reason));
            }
            Err(e) => return Err(TurnError::from_store(e)),
        };

        if updated.data_state() == DataState::Complete && !updated.compliance().is_settled() {
            updated = self.record_compliance(updated).await;
        }

        let decision = decided.unwrap_or_else(|| decide(&updated));
        tracing::info!(
            session_id = %updated.id(),
            data_state = %updated.data_state(),
            completion = updated.completion_percentage(),
            degraded = degraded.is_some(),
            "Turn handled"
        );

        Ok(TurnOutcome {
            session_id: updated.id(),
            action: decision.action,
            question: decision.question,
            reply: decision.reply,
            snapshot: SessionSnapshot::from(&updated),
            export: None,
            headers,
            degraded,
        })
    }

    /// Exports a completed session owned by `client_id`.
    ///
    /// Exporting again returns the same snapshot.
    pub async fn export(
        &self,
        session_id: &SessionId,
        client_id: &ClientId,
    ) -> Result<ExportSnapshot, TurnError> {
        let session = self.load_owned(session_id, client_id).await?;
        let (_, export) = self.export_session(session).await?;
        Ok(export)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Steps
    // ════════════════════════════════════════════════════════════════════════

    async fn admit(&self, client_id: &ClientId) -> Result<HeaderMap, TurnError> {
        match self.limiter.check(client_id).await {
            Ok(decision) if decision.allowed => Ok(rate_limit_headers(&decision)),
            Ok(decision) => {
                tracing::info!(
                    client = %bucket_key(client_id),
                    retry_after_ms = decision.retry_after.as_millis() as u64,
                    "Turn rate limited"
                );
                Err(TurnError::RateLimited {
                    retry_after: decision.retry_after,
                    headers: rate_limit_headers(&decision),
                })
            }
            Err(e) => {
                // Fail open.
                tracing::warn!(error = %e, "Rate limiter unavailable, admitting turn");
                Ok(HeaderMap::new())
            }
        }
    }

    async fn load_owned(
        &self,
        session_id: &SessionId,
        client_id: &ClientId,
    ) -> Result<Session, TurnError> {
        let session = self
            .store
            .get(session_id)
            .await
            .map_err(TurnError::from_store)?;
        if session.owner_id() != client_id {
            tracing::warn!(session_id = %session_id, "Session requested by a different client");
            return Err(TurnError::SessionNotFound(*session_id));
        }
        Ok(session)
    }

    async fn open_session(&self, request: &TurnRequest) -> Result<Session, TurnError> {
        if let Some(id) = &request.session_id {
            return self.load_owned(id, &request.client_id).await;
        }
        if let UserInput::Export = request.input {
            return Err(TurnError::InvalidInput(
                "there is no session to export yet".to_string(),
            ));
        }

        let session = Session::new(
            SessionId::new(),
            request.client_id.clone(),
            self.settings.required_fields.iter().cloned(),
            self.settings.session_ttl_seconds,
            self.clock.now(),
        );
        self.store
            .create(session.clone())
            .await
            .map_err(TurnError::from_store)?;
        Ok(session)
    }

    async fn plan(
        &self,
        session: &Session,
        input: &UserInput,
    ) -> Result<(TurnPlan, Option<String>), TurnError> {
        let exported = session.data_state() == DataState::Exported;
        match input {
            UserInput::Message { text } => {
                if matches!(session.data_state(), DataState::Complete | DataState::Exported) {
                    return Ok((TurnPlan::Record, None));
                }
                if let Some(pending) = session.pending_confirmations().first() {
                    return Ok((
                        TurnPlan::Reply {
                            field: pending.field.clone(),
                            answer: parse_confirmation_reply(text),
                        },
                        None,
                    ));
                }
                Ok(self.extract(session, text).await)
            }
            UserInput::Statement { field, value } => {
                if exported {
                    return Err(TurnError::InvalidInput(
                        "the session has already been exported".to_string(),
                    ));
                }
                check_field(session, field)?;
                Ok((
                    TurnPlan::State {
                        field: field.clone(),
                        value: value.trim().to_string(),
                    },
                    None,
                ))
            }
            UserInput::Answer { field, value } => {
                if exported {
                    return Err(TurnError::InvalidInput(
                        "the session has already been exported".to_string(),
                    ));
                }
                check_field(session, field)?;
                let plan = if session.pending_for(field).is_some() {
                    TurnPlan::Reply {
                        field: field.clone(),
                        answer: parse_confirmation_reply(value),
                    }
                } else {
                    TurnPlan::State {
                        field: field.clone(),
                        value: value.trim().to_string(),
                    }
                };
                Ok((plan, None))
            }
            UserInput::Export => Ok((TurnPlan::Record, None)),
        }
    }

    /// Runs extraction through the model endpoint breaker. Any failure
    /// degrades to asking the user directly.
    async fn extract(&self, session: &Session, text: &str) -> (TurnPlan, Option<String>) {
        let window = self.settings.history_window.max(1);
        let mut history = session.history_window(window - 1).to_vec();
        history.push(Turn::user(text, self.clock.now()));
        let request = ExtractionRequest {
            history,
            missing_fields: session
                .missing_in_order()
                .into_iter()
                .map(str::to_string)
                .collect(),
        };

        let breaker = self.breakers.dependency(Dependency::ModelEndpoint);
        let result = breaker
            .execute_with(|| self.extractor.extract(&request), ExtractionError::is_transient)
            .await;

        match result {
            Ok(result) => (TurnPlan::Merge(result.fields), None),
            Err(err) => {
                let reason = match &err {
                    BreakerError::Open { .. } => "extraction unavailable (circuit open)".to_string(),
                    BreakerError::Timeout { .. } => "extraction timed out".to_string(),
                    BreakerError::Inner(e) => format!("extraction failed: {}", e),
                };
                tracing::warn!(session_id = %session.id(), reason = %reason, "Falling back to direct questions");
                (TurnPlan::Record, Some(reason))
            }
        }
    }

    /// Runs the compliance check and stores its status. Storage failures
    /// here leave the turn's own write in place.
    async fn record_compliance(&self, session: Session) -> Session {
        let request = ComplianceRequest {
            session_id: session.id(),
            fields: session
                .collected_fields()
                .iter()
                .map(|(name, field)| (name.clone(), field.value.clone()))
                .collect(),
        };

        let breaker = self.breakers.dependency(Dependency::Compliance);
        let status = match breaker
            .execute_with(|| self.compliance.check(&request), ComplianceError::is_transient)
            .await
        {
            Ok(report) if report.passed => ComplianceStatus::Passed,
            Ok(report) => ComplianceStatus::Failed {
                findings: report.findings,
            },
            Err(BreakerError::Open { .. }) => ComplianceStatus::Skipped {
                reason: "compliance service unavailable (circuit open)".to_string(),
            },
            Err(BreakerError::Timeout { .. }) => ComplianceStatus::Skipped {
                reason: "compliance check timed out".to_string(),
            },
            Err(BreakerError::Inner(e)) => ComplianceStatus::Skipped {
                reason: e.to_string(),
            },
        };

        if let ComplianceStatus::Skipped { reason } = &status {
            tracing::warn!(session_id = %session.id(), reason = %reason, "Compliance check skipped");
        }

        match self
            .store
            .update(&session.id(), |s| {
                if s.data_state() == DataState::Complete {
                    s.set_compliance(status.clone());
                }
                Ok(())
            })
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Compliance status not saved");
                session
            }
        }
    }

    async fn export_session(
        &self,
        session: Session,
    ) -> Result<(Session, ExportSnapshot), TurnError> {
        if let Some(export) = ExportSnapshot::of(&session) {
            return Ok((session, export));
        }
        if !session.data_state().is_exportable() {
            return Err(TurnError::ExportNotReady {
                missing: outstanding_fields(&session),
            });
        }

        let now = self.clock.now();
        let exported = self
            .store
            .update(&session.id(), |s| {
                if !s.data_state().is_exportable() {
                    return Err(SessionStoreError::InvalidState(
                        "session is no longer complete".to_string(),
                    ));
                }
                s.mark_exported(now)
                    .map_err(|e| SessionStoreError::InvalidState(e.to_string()))?;
                Ok(())
            })
            .await
            .map_err(TurnError::from_store)?;

        let export = ExportSnapshot::of(&exported).ok_or_else(|| {
            TurnError::StorageUnavailable("export was not recorded".to_string())
        })?;
        tracing::info!(session_id = %exported.id(), fields = export.fields.len(), "Session exported");
        Ok((exported, export))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Pure turn logic
// ════════════════════════════════════════════════════════════════════════════

fn check_field(session: &Session, field: &str) -> Result<(), TurnError> {
    if is_known_field(field) || session.is_required(field) {
        Ok(())
    } else {
        Err(TurnError::InvalidInput(format!("unknown field '{}'", field)))
    }
}

fn user_turn_text(input: &UserInput) -> String {
    match input {
        UserInput::Message { text } => text.clone(),
        UserInput::Statement { field, value } => format!("{}: {}", field, value),
        UserInput::Answer { value, .. } => value.clone(),
        UserInput::Export => "export".to_string(),
    }
}

fn outstanding_fields(session: &Session) -> Vec<String> {
    let mut fields: Vec<String> = session
        .missing_in_order()
        .into_iter()
        .map(str::to_string)
        .collect();
    for pending in session.pending_confirmations() {
        if !fields.contains(&pending.field) {
            fields.push(pending.field.clone());
        }
    }
    fields
}

/// Applies a planned turn to a freshly read session. Runs again on every
/// version conflict, so it only depends on its arguments.
fn apply_plan(
    session: &mut Session,
    plan: &TurnPlan,
    user_text: &str,
    bands: &ConfidenceBands,
    now: Timestamp,
) -> Result<Decision, SessionStoreError> {
    let was_complete = session.data_state() == DataState::Complete;
    session.push_turn(Turn::user(user_text, now));

    match plan {
        TurnPlan::Record => {}
        TurnPlan::Merge(fields) => {
            for extracted in fields {
                if !is_known_field(&extracted.name) && !session.is_required(&extracted.name) {
                    tracing::debug!(field = %extracted.name, "Ignoring extracted field outside the catalog");
                    continue;
                }
                let outcome = session.propose_extraction(
                    &extracted.name,
                    &extracted.value,
                    extracted.confidence,
                    bands,
                    now,
                );
                if let MergeOutcome::RejectedConfirmed { kept, proposed } = outcome {
                    tracing::warn!(
                        session_id = %session.id(),
                        field = %extracted.name,
                        kept = %kept,
                        proposed = %proposed,
                        confidence = extracted.confidence,
                        "Extraction conflicts with a confirmed value, discarded"
                    );
                }
            }
        }
        TurnPlan::Reply { field, answer } => {
            if !session.resolve_confirmation(field, answer.clone(), now) {
                // The question was settled by a concurrent turn; a literal
                // value still counts as a statement.
                if let ConfirmationAnswer::Replace(value) = answer {
                    session.record_user_value(field, value.clone(), FieldSource::UserStatement, now);
                }
            }
        }
        TurnPlan::State { field, value } => {
            session.record_user_value(field, value.clone(), FieldSource::UserStatement, now);
        }
    }

    if was_complete && plan.changes_fields() && session.compliance().is_settled() {
        session.set_compliance(ComplianceStatus::NotChecked);
    }

    session
        .refresh_state()
        .map_err(|e| SessionStoreError::InvalidState(e.to_string()))?;

    let decision = decide(session);
    session.push_turn(Turn::assistant(decision.reply.clone(), now));
    if let Some(question) = &decision.question {
        session.record_question(question.text.clone());
    }
    Ok(decision)
}

fn decide(session: &Session) -> Decision {
    if session.data_state() == DataState::Exported {
        return Decision {
            action: NextAction::Exported,
            question: None,
            reply: "This estimate has already been exported.".to_string(),
        };
    }

    if let Some(pending) = session.pending_confirmations().first() {
        let question = confirmation_question(pending);
        return Decision {
            action: NextAction::ConfirmField {
                field: pending.field.clone(),
            },
            reply: question.text.clone(),
            question: Some(question),
        };
    }

    match next_question(session) {
        Some(question) => Decision {
            action: NextAction::AskForField {
                field: question.field.clone(),
            },
            reply: question.text.clone(),
            question: Some(question),
        },
        None => Decision {
            action: NextAction::ReviewAndExport,
            question: None,
            reply: "I have everything the estimate needs. Review the fields and ask to export when ready."
                .to_string(),
        },
    }
}

fn storage_failure_outcome(mut session: Session, headers: HeaderMap, reason: String) -> TurnOutcome {
    session.mark_error();
    TurnOutcome {
        session_id: session.id(),
        action: NextAction::RetryLater,
        question: None,
        reply: STORAGE_RETRY_REPLY.to_string(),
        snapshot: SessionSnapshot::from(&session),
        export: None,
        headers,
        degraded: Some(reason),
    }
}
