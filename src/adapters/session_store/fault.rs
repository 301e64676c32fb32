//! Fault-injecting wrapper for exercising the failover chain.
//!
//! Wraps any backend and can make it unreachable, slow, slow only on reads,
//! refuse removals, or refuse every write with a version conflict. Counts forwarded calls
//! and reported conflicts.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::domain::foundation::{ClientId, SessionId};
use crate::domain::session::Session;
use crate::ports::{BackendError, SessionBackend, WriteCondition};

pub struct FaultInjectingBackend<B> {
    inner: B,
    name: String,
    unavailable: AtomicBool,
    conflicting: AtomicBool,
    failing_removals: AtomicBool,
    delay: Mutex<Option<Duration>>,
    load_delay: Mutex<Option<Duration>>,
    calls: AtomicU64,
    conflicts: AtomicU64,
}

impl<B: SessionBackend> FaultInjectingBackend<B> {
    /// Wraps `inner`, reporting under `name` in health and logs.
    pub fn new(name: impl Into<String>, inner: B) -> Self {
        Self {
            inner,
            name: name.into(),
            unavailable: AtomicBool::new(false),
            conflicting: AtomicBool::new(false),
            failing_removals: AtomicBool::new(false),
            delay: Mutex::new(None),
            load_delay: Mutex::new(None),
            calls: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Every call fails with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every write reports a version conflict while set.
    pub fn set_conflicting(&self, conflicting: bool) {
        self.conflicting.store(conflicting, Ordering::SeqCst);
    }

    /// `remove` fails with `Unavailable` while set; other calls succeed.
    pub fn set_failing_removals(&self, failing: bool) {
        self.failing_removals.store(failing, Ordering::SeqCst);
    }

    /// Delays every call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Delays `load` only, after the read has happened.
    pub fn set_load_delay(&self, delay: Option<Duration>) {
        *self.load_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Calls forwarded or refused so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Version conflicts reported by the inner backend.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::SeqCst)
    }

    async fn before_call(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable(&self.name, "injected outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl<B: SessionBackend> SessionBackend for FaultInjectingBackend<B> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, BackendError> {
        self.before_call().await?;
        let loaded = self.inner.load(id).await?;
        let delay = *self.load_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(loaded)
    }

    async fn store(&self, session: &Session, condition: WriteCondition) -> Result<(), BackendError> {
        self.before_call().await?;
        let result = if self.conflicting.load(Ordering::SeqCst) {
            Err(BackendError::VersionConflict(session.id()))
        } else {
            self.inner.store(session, condition).await
        };
        if matches!(result, Err(BackendError::VersionConflict(_))) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn remove(&self, id: &SessionId) -> Result<bool, BackendError> {
        self.before_call().await?;
        if self.failing_removals.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable(&self.name, "injected removal failure"));
        }
        self.inner.remove(id).await
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, BackendError> {
        self.before_call().await?;
        self.inner.list_ids().await
    }

    async fn list_by_owner(&self, owner: &ClientId) -> Result<Vec<SessionId>, BackendError> {
        self.before_call().await?;
        self.inner.list_by_owner(owner).await
    }
}
