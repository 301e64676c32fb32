//! Session backend port - one storage tier of the session failover chain.
//!
//! The session store orders several backends (shared cache, database or
//! file directory, process memory) and decides which one serves each call.
//! Backends only persist whole session documents and enforce the write
//! condition they are given.

use async_trait::async_trait;

use crate::domain::foundation::{ClientId, SessionId};
use crate::domain::session::Session;

/// Precondition checked atomically by a backend before a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Only write if no record exists.
    Create,
    /// Only write if the stored record carries this version.
    Version(u64),
    /// Write unconditionally (used to promote a record to a higher tier).
    Upsert,
}

impl WriteCondition {
    /// Evaluates the condition against the version currently stored, if any.
    pub fn permits(&self, stored: Option<u64>) -> bool {
        match (self, stored) {
            (WriteCondition::Create, None) => true,
            (WriteCondition::Create, Some(_)) => false,
            (WriteCondition::Version(expected), Some(current)) => *expected == current,
            (WriteCondition::Version(_), None) => false,
            (WriteCondition::Upsert, _) => true,
        }
    }
}

/// Errors from a single backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// The backend cannot be reached or refused the operation.
    #[error("backend '{backend}' unavailable: {message}")]
    Unavailable { backend: String, message: String },

    /// The operation did not complete in time.
    #[error("backend '{backend}' timed out")]
    Timeout { backend: String },

    /// The write condition did not hold.
    #[error("version conflict on session {0}")]
    VersionConflict(SessionId),

    /// A stored document could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl BackendError {
    pub fn unavailable(backend: impl Into<String>, message: impl ToString) -> Self {
        BackendError::Unavailable {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    /// True for failures that should move the call down the chain.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            BackendError::Unavailable { .. } | BackendError::Timeout { .. }
        )
    }
}

/// Port for one tier of session storage.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Short name used in logs and health reports.
    fn name(&self) -> &str;

    /// Loads a session document, `None` if absent.
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, BackendError>;

    /// Writes the whole document if `condition` holds.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::VersionConflict` when the condition fails.
    async fn store(&self, session: &Session, condition: WriteCondition) -> Result<(), BackendError>;

    /// Removes a session. Returns whether a record existed.
    async fn remove(&self, id: &SessionId) -> Result<bool, BackendError>;

    /// All stored session ids.
    async fn list_ids(&self) -> Result<Vec<SessionId>, BackendError>;

    /// Ids of the sessions owned by `owner`.
    async fn list_by_owner(&self, owner: &ClientId) -> Result<Vec<SessionId>, BackendError>;
}

/// Errors surfaced by the session store as a whole.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("session {0} expired")]
    Expired(SessionId),

    #[error("session {id} modified concurrently, gave up after {attempts} attempts")]
    ConcurrentModification { id: SessionId, attempts: u32 },

    #[error("no session backend available: {0}")]
    BackendUnavailable(String),

    #[error("owner {owner} already has {limit} active sessions")]
    SessionLimitReached { owner: ClientId, limit: usize },

    #[error("invalid session state: {0}")]
    InvalidState(String),
}
