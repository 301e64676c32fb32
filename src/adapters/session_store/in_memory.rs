//! In-memory session backend, the last tier of the failover chain.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{ClientId, SessionId};
use crate::domain::session::Session;
use crate::ports::{BackendError, SessionBackend, WriteCondition};

/// Sessions held in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionBackend {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl InMemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Clear all stored data (useful for tests)
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}

#[async_trait]
impl SessionBackend for InMemorySessionBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, BackendError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn store(&self, session: &Session, condition: WriteCondition) -> Result<(), BackendError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions.get(&session.id()).map(Session::version);
        if !condition.permits(stored) {
            return Err(BackendError::VersionConflict(session.id()));
        }
        sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> Result<bool, BackendError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, BackendError> {
        Ok(self.sessions.read().await.keys().copied().collect())
    }

    async fn list_by_owner(&self, owner: &ClientId) -> Result<Vec<SessionId>, BackendError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.owner_id() == owner)
            .map(Session::id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    fn session(owner: &str) -> Session {
        Session::new(
            SessionId::new(),
            ClientId::new(owner).unwrap(),
            ["origin_city"],
            3600,
            Timestamp::now(),
        )
    }

    #[tokio::test]
    async fn create_then_load() {
        let backend = InMemorySessionBackend::new();
        let s = session("owner");

        backend.store(&s, WriteCondition::Create).await.unwrap();

        assert_eq!(backend.load(&s.id()).await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let backend = InMemorySessionBackend::new();
        let s = session("owner");
        backend.store(&s, WriteCondition::Create).await.unwrap();

        let err = backend.store(&s, WriteCondition::Create).await.unwrap_err();
        assert_eq!(err, BackendError::VersionConflict(s.id()));
    }

    #[tokio::test]
    async fn versioned_write_checks_stored_version() {
        let backend = InMemorySessionBackend::new();
        let mut s = session("owner");
        backend.store(&s, WriteCondition::Create).await.unwrap();

        s.set_version(1);
        backend.store(&s, WriteCondition::Version(0)).await.unwrap();

        s.set_version(2);
        let err = backend.store(&s, WriteCondition::Version(0)).await.unwrap_err();
        assert!(matches!(err, BackendError::VersionConflict(_)));
        assert_eq!(backend.load(&s.id()).await.unwrap().unwrap().version(), 1);
    }

    #[tokio::test]
    async fn lists_by_owner() {
        let backend = InMemorySessionBackend::new();
        let a = session("alice");
        let b = session("bob");
        backend.store(&a, WriteCondition::Create).await.unwrap();
        backend.store(&b, WriteCondition::Create).await.unwrap();

        let ids = backend.list_by_owner(&ClientId::new("alice").unwrap()).await.unwrap();
        assert_eq!(ids, vec![a.id()]);
        assert_eq!(backend.list_ids().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn remove_reports_existence() {
        let backend = InMemorySessionBackend::new();
        let s = session("owner");
        backend.store(&s, WriteCondition::Create).await.unwrap();

        assert!(backend.remove(&s.id()).await.unwrap());
        assert!(!backend.remove(&s.id()).await.unwrap());
        assert!(backend.is_empty().await);
    }
}
