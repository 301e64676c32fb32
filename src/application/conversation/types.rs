//! Requests, outcomes and errors of the turn API.

use http::HeaderMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::conversation::{Question, UserInput, BOE_REQUIRED_FIELDS};
use crate::domain::foundation::{ClientId, DomainError, ErrorCode, SessionId, Timestamp};
use crate::domain::session::{
    CollectedField, ComplianceStatus, ConfidenceBands, DataState, PendingConfirmation, Session,
    DEFAULT_TTL_SECONDS,
};
use crate::ports::SessionStoreError;

/// Dialogue settings applied to every session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSettings {
    pub required_fields: Vec<String>,
    pub bands: ConfidenceBands,
    /// How many past turns the extractor sees.
    pub history_window: usize,
    pub session_ttl_seconds: u64,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            required_fields: BOE_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            bands: ConfidenceBands::default(),
            history_window: 10,
            session_ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

/// One inbound turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// `None` starts a new session.
    pub session_id: Option<SessionId>,
    pub client_id: ClientId,
    pub input: UserInput,
}

impl TurnRequest {
    pub fn new(session_id: Option<SessionId>, client_id: ClientId, input: UserInput) -> Self {
        Self {
            session_id,
            client_id,
            input,
        }
    }
}

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    AskForField { field: String },
    ConfirmField { field: String },
    /// Everything required is collected.
    ReviewAndExport,
    Exported,
    /// Storage failed; the same turn can be sent again.
    RetryLater,
}

/// Read-only view of a session returned with every turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub data_state: DataState,
    pub collected_fields: BTreeMap<String, CollectedField>,
    pub missing_required_fields: Vec<String>,
    pub pending_confirmations: Vec<PendingConfirmation>,
    pub completion_percentage: u8,
    pub compliance: ComplianceStatus,
    pub version: u64,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id(),
            data_state: session.data_state(),
            collected_fields: session.collected_fields().clone(),
            missing_required_fields: session
                .missing_in_order()
                .into_iter()
                .map(str::to_string)
                .collect(),
            pending_confirmations: session.pending_confirmations().to_vec(),
            completion_percentage: session.completion_percentage(),
            compliance: session.compliance().clone(),
            version: session.version(),
        }
    }
}

/// Field values handed to report rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSnapshot {
    pub session_id: SessionId,
    pub fields: BTreeMap<String, String>,
    pub completion_percentage: u8,
    pub compliance: ComplianceStatus,
    pub exported_at: Timestamp,
}

impl ExportSnapshot {
    /// Projection of an exported session; `None` before export.
    pub fn of(session: &Session) -> Option<Self> {
        Some(Self {
            session_id: session.id(),
            fields: session
                .collected_fields()
                .iter()
                .map(|(name, field)| (name.clone(), field.value.clone()))
                .collect(),
            completion_percentage: session.completion_percentage(),
            compliance: session.compliance().clone(),
            exported_at: session.exported_at()?,
        })
    }
}

/// Result of a handled turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: SessionId,
    pub action: NextAction,
    pub question: Option<Question>,
    /// Assistant text for this turn.
    pub reply: String,
    pub snapshot: SessionSnapshot,
    pub export: Option<ExportSnapshot>,
    pub headers: HeaderMap,
    /// Set when a dependency was skipped and the turn took a fallback path.
    pub degraded: Option<String>,
}

/// User-facing turn failures. Each maps to an actionable message.
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        headers: HeaderMap,
    },

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {0} expired")]
    SessionExpired(SessionId),

    #[error("too many open sessions (limit {limit})")]
    SessionLimitReached { limit: usize },

    #[error("session {0} is busy")]
    ConcurrentModification(SessionId),

    #[error("session storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("export not ready, missing: {}", missing.join(", "))]
    ExportNotReady { missing: Vec<String> },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl TurnError {
    pub(crate) fn from_store(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::NotFound(id) => TurnError::SessionNotFound(id),
            SessionStoreError::Expired(id) => TurnError::SessionExpired(id),
            SessionStoreError::ConcurrentModification { id, .. } => {
                TurnError::ConcurrentModification(id)
            }
            SessionStoreError::BackendUnavailable(msg) => TurnError::StorageUnavailable(msg),
            SessionStoreError::SessionLimitReached { limit, .. } => {
                TurnError::SessionLimitReached { limit }
            }
            SessionStoreError::InvalidState(msg) => TurnError::InvalidInput(msg),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            TurnError::RateLimited { .. } => ErrorCode::RateLimited,
            TurnError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            TurnError::SessionExpired(_) => ErrorCode::SessionExpired,
            TurnError::SessionLimitReached { .. } => ErrorCode::SessionLimitReached,
            TurnError::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            TurnError::StorageUnavailable(_) => ErrorCode::BackendUnavailable,
            TurnError::ExportNotReady { .. } => ErrorCode::ExportNotReady,
            TurnError::InvalidInput(_) => ErrorCode::ValidationFailed,
        }
    }

    /// Converts to a domain error carrying what the user can do about it.
    pub fn to_domain_error(&self) -> DomainError {
        let code = self.code();
        match self {
            TurnError::RateLimited { retry_after, .. } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                DomainError::new(code, format!("Too many requests. Retry in {} seconds.", secs.max(1)))
                    .with_detail("retry_after_secs", secs.max(1).to_string())
            }
            TurnError::SessionNotFound(id) | TurnError::SessionExpired(id) => DomainError::new(
                code,
                "This conversation is no longer available. Please start a new session.",
            )
            .with_detail("session_id", id.to_string()),
            TurnError::SessionLimitReached { limit } => DomainError::new(
                code,
                format!("You already have {} open sessions. Finish or wait for one to expire.", limit),
            ),
            TurnError::ConcurrentModification(id) => {
                DomainError::new(code, "Another request updated this session. Please retry.")
                    .with_detail("session_id", id.to_string())
            }
            TurnError::StorageUnavailable(_) => {
                DomainError::new(code, "Session storage is temporarily unavailable. Please retry.")
            }
            TurnError::ExportNotReady { missing } => DomainError::new(
                code,
                format!("Cannot export yet. Please provide: {}.", missing.join(", ")),
            ),
            TurnError::InvalidInput(reason) => DomainError::new(code, reason.clone()),
        }
    }
}
