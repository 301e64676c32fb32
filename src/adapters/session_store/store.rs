//! Session store - ordered failover chain over session backends.
//!
//! Backends are tried in priority order. Reads stop at the first backend
//! that has the record and only skip a backend when it is unreachable or
//! in a degraded cool-down. Writes target the first reachable backend and
//! carry the version read, so concurrent updates never overwrite each other.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::adapters::resilience::DegradationTracker;
use crate::domain::foundation::{ClientId, SessionId, Timestamp};
use crate::domain::session::Session;
use crate::ports::{BackendError, Clock, SessionBackend, SessionStoreError, WriteCondition};

/// Tunables for the failover chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStoreOptions {
    pub max_sessions_per_owner: usize,
    pub backend_timeout: Duration,
    /// Consecutive unreachable results before a backend is skipped.
    pub degrade_after: u32,
    pub cool_down: Duration,
    pub max_update_attempts: u32,
}

impl Default for SessionStoreOptions {
    fn default() -> Self {
        Self {
            max_sessions_per_owner: 5,
            backend_timeout: Duration::from_millis(500),
            degrade_after: 3,
            cool_down: Duration::from_secs(30),
            max_update_attempts: 5,
        }
    }
}

/// Reachability of one backend, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub degraded: bool,
}

/// Sessions checked at once per backend during a sweep.
const SWEEP_CONCURRENCY: usize = 8;

struct Tier {
    backend: Arc<dyn SessionBackend>,
    health: DegradationTracker,
}

impl Tier {
    fn name(&self) -> &str {
        self.backend.name()
    }
}

pub struct SessionStore {
    tiers: Vec<Tier>,
    options: SessionStoreOptions,
    clock: Arc<dyn Clock>,
    /// Backends still holding an outdated copy of a session that moved down
    /// the chain. Reads of these sessions compare versions across backends
    /// until the old copy is gone.
    stale: Mutex<HashMap<SessionId, BTreeSet<usize>>>,
}

impl SessionStore {
    /// Builds a store over `backends`, highest priority first.
    pub fn new(
        backends: Vec<Arc<dyn SessionBackend>>,
        options: SessionStoreOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tiers = backends
            .into_iter()
            .map(|backend| Tier {
                backend,
                health: DegradationTracker::new(
                    options.degrade_after,
                    options.cool_down,
                    clock.clone(),
                ),
            })
            .collect();
        Self {
            tiers,
            options,
            clock,
            stale: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &SessionStoreOptions {
        &self.options
    }

    /// Per-backend reachability, in chain order.
    pub fn backend_status(&self) -> Vec<BackendStatus> {
        self.tiers
            .iter()
            .map(|t| BackendStatus {
                name: t.name().to_string(),
                degraded: t.health.is_degraded(),
            })
            .collect()
    }

    /// True if any backend is in a cool-down window.
    pub fn is_degraded(&self) -> bool {
        self.tiers.iter().any(|t| t.health.is_degraded())
    }

    // ════════════════════════════════════════════════════════════════════════
    // Operations
    // ════════════════════════════════════════════════════════════════════════

    /// Persists a new session on the first reachable backend.
    ///
    /// Expired sessions of the same owner are evicted first; the owner cap
    /// counts only live sessions.
    pub async fn create(&self, session: Session) -> Result<SessionId, SessionStoreError> {
        let owner = session.owner_id().clone();
        let live = self.live_sessions_of(&owner).await?;
        if live >= self.options.max_sessions_per_owner {
            tracing::warn!(
                owner_id = %owner,
                live,
                limit = self.options.max_sessions_per_owner,
                "Session limit reached"
            );
            return Err(SessionStoreError::SessionLimitReached {
                owner,
                limit: self.options.max_sessions_per_owner,
            });
        }

        let id = session.id();
        for tier in self.reachable() {
            match self
                .attempt(tier, tier.backend.store(&session, WriteCondition::Create))
                .await
            {
                Ok(()) => {
                    tracing::info!(session_id = %id, backend = tier.name(), "Session created");
                    return Ok(id);
                }
                Err(BackendError::VersionConflict(_)) => {
                    return Err(SessionStoreError::InvalidState(format!(
                        "session {} already exists",
                        id
                    )));
                }
                Err(e) if e.is_unreachable() => continue,
                Err(e) => return Err(SessionStoreError::InvalidState(e.to_string())),
            }
        }
        Err(self.exhausted("create"))
    }

    /// Loads a live session and records the access.
    ///
    /// An idle session past its TTL is marked expired and reported as such.
    pub async fn get(&self, id: &SessionId) -> Result<Session, SessionStoreError> {
        let (source, mut session) = self.locate(id).await?;
        let now = self.clock.now();
        let tier = &self.tiers[source];

        if session.is_expired(now) {
            let expected = session.version();
            session.mark_expired();
            session.set_version(expected + 1);
            if let Err(e) = self
                .attempt(tier, tier.backend.store(&session, WriteCondition::Version(expected)))
                .await
            {
                tracing::debug!(session_id = %id, error = %e, "Could not persist expiry mark");
            }
            return Err(SessionStoreError::Expired(*id));
        }

        // The access stamp does not bump the version: a concurrent update
        // either lands first and fails this write, or lands after and
        // carries its own stamp.
        session.touch(now);
        let expected = session.version();
        if let Err(e) = self
            .attempt(tier, tier.backend.store(&session, WriteCondition::Version(expected)))
            .await
        {
            tracing::debug!(session_id = %id, error = %e, "Skipped access stamp");
        }
        Ok(session)
    }

    /// Read-modify-write with optimistic concurrency.
    ///
    /// The mutator may run more than once; it is re-applied to a fresh read
    /// after every version conflict, up to the configured attempt bound.
    pub async fn update<F>(&self, id: &SessionId, mut mutator: F) -> Result<Session, SessionStoreError>
    where
        F: FnMut(&mut Session) -> Result<(), SessionStoreError> + Send,
    {
        let attempts = self.options.max_update_attempts.max(1);
        for attempt in 1..=attempts {
            let (source, mut session) = self.locate(id).await?;
            let now = self.clock.now();
            if session.is_expired(now) {
                return Err(SessionStoreError::Expired(*id));
            }

            mutator(&mut session)?;
            session.touch(now);
            let expected = session.version();
            session.set_version(expected + 1);

            match self.write_back(&session, source, expected).await {
                Ok(target) => {
                    if target != source {
                        self.drop_stale_copy(id, source, target).await;
                    }
                    return Ok(session);
                }
                Err(WriteBackError::Conflict) => {
                    tracing::debug!(session_id = %id, attempt, "Version conflict, retrying update");
                }
                Err(WriteBackError::Store(e)) => return Err(e),
            }
        }

        tracing::warn!(session_id = %id, attempts, "Update abandoned after repeated conflicts");
        Err(SessionStoreError::ConcurrentModification {
            id: *id,
            attempts,
        })
    }

    /// Removes a session from every reachable backend.
    pub async fn delete(&self, id: &SessionId) -> Result<bool, SessionStoreError> {
        let mut removed = false;
        let mut unreachable = false;
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.health.is_degraded() {
                unreachable = true;
                continue;
            }
            match self.attempt(tier, tier.backend.remove(id)).await {
                Ok(r) => {
                    removed |= r;
                    self.clear_stale(id, index);
                }
                Err(e) => {
                    tracing::warn!(session_id = %id, backend = tier.name(), error = %e, "Delete failed on backend");
                    unreachable = true;
                }
            }
        }
        if !removed && unreachable {
            return Err(self.exhausted("delete"));
        }
        Ok(removed)
    }

    /// Evicts every expired session from every reachable backend.
    ///
    /// Returns the number of distinct sessions evicted.
    pub async fn sweep_expired(&self) -> Result<usize, SessionStoreError> {
        let now = self.clock.now();
        let mut evicted = BTreeSet::new();

        for tier in self.reachable() {
            let ids = match self.attempt(tier, tier.backend.list_ids()).await {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(backend = tier.name(), error = %e, "Sweep skipped backend");
                    continue;
                }
            };
            let removed: Vec<SessionId> = stream::iter(ids)
                .map(|id| self.evict_if_expired(tier, id, now))
                .buffer_unordered(SWEEP_CONCURRENCY)
                .filter_map(|removed| async move { removed })
                .collect()
                .await;
            evicted.extend(removed);
        }

        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Expired sessions evicted");
        }
        Ok(evicted.len())
    }

    async fn evict_if_expired(&self, tier: &Tier, id: SessionId, now: Timestamp) -> Option<SessionId> {
        match self.attempt(tier, tier.backend.load(&id)).await {
            Ok(Some(session)) if session.is_expired(now) => {
                match self.attempt(tier, tier.backend.remove(&id)).await {
                    Ok(true) => Some(id),
                    _ => None,
                }
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(session_id = %id, backend = tier.name(), error = %e, "Sweep could not read session");
                None
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Chain mechanics
    // ════════════════════════════════════════════════════════════════════════

    fn reachable(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter().filter(|t| !t.health.is_degraded())
    }

    fn exhausted(&self, operation: &str) -> SessionStoreError {
        tracing::error!(operation, "All session backends unavailable");
        SessionStoreError::BackendUnavailable(format!("no backend could {}", operation))
    }

    /// Runs one backend call under the per-backend timeout and feeds the
    /// outcome into the backend's degradation tracker.
    async fn attempt<T, Fut>(&self, tier: &Tier, call: Fut) -> Result<T, BackendError>
    where
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let result = match tokio::time::timeout(self.options.backend_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                backend: tier.name().to_string(),
            }),
        };

        match &result {
            Err(e) if e.is_unreachable() => {
                if tier.health.record_failure() {
                    tracing::warn!(
                        backend = tier.name(),
                        cool_down_secs = self.options.cool_down.as_secs(),
                        error = %e,
                        "Session backend degraded"
                    );
                }
            }
            _ => tier.health.record_success(),
        }
        result
    }

    /// Finds a session, returning the index of the backend that holds it.
    async fn locate(&self, id: &SessionId) -> Result<(usize, Session), SessionStoreError> {
        let stale = self.stale_copies(id);
        if !stale.is_empty() {
            return self.reconcile(id, &stale).await;
        }

        let mut unreachable = false;
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.health.is_degraded() {
                unreachable = true;
                continue;
            }
            match self.attempt(tier, tier.backend.load(id)).await {
                Ok(Some(session)) => {
                    if unreachable {
                        tracing::warn!(session_id = %id, backend = tier.name(), "Session served by fallback backend");
                    }
                    return Ok((index, session));
                }
                Ok(None) => {}
                Err(e) if e.is_unreachable() => {
                    tracing::warn!(session_id = %id, backend = tier.name(), error = %e, "Session backend unreachable, trying next");
                    unreachable = true;
                }
                Err(e) => return Err(SessionStoreError::InvalidState(e.to_string())),
            }
        }

        if unreachable {
            // The record may live on a backend we could not ask.
            Err(self.exhausted("read"))
        } else {
            Err(SessionStoreError::NotFound(*id))
        }
    }

    /// Writes to the first reachable backend. Returns the backend index.
    ///
    /// The backend the session was read from gets a version-guarded write;
    /// a higher backend gets a create, so a concurrent promotion conflicts
    /// instead of being overwritten.
    async fn write_back(
        &self,
        session: &Session,
        source: usize,
        expected: u64,
    ) -> Result<usize, WriteBackError> {
        let stale = self.stale_copies(&session.id());
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.health.is_degraded() || stale.contains(&index) {
                continue;
            }
            let condition = match index.cmp(&source) {
                std::cmp::Ordering::Less => WriteCondition::Create,
                std::cmp::Ordering::Equal => WriteCondition::Version(expected),
                std::cmp::Ordering::Greater => WriteCondition::Upsert,
            };
            match self.attempt(tier, tier.backend.store(session, condition)).await {
                Ok(()) => {
                    if index != source {
                        tracing::info!(
                            session_id = %session.id(),
                            from = self.tiers[source].name(),
                            to = tier.name(),
                            "Session moved between backends"
                        );
                    }
                    return Ok(index);
                }
                Err(BackendError::VersionConflict(_)) => return Err(WriteBackError::Conflict),
                Err(e) if e.is_unreachable() => continue,
                Err(e) => {
                    return Err(WriteBackError::Store(SessionStoreError::InvalidState(
                        e.to_string(),
                    )))
                }
            }
        }
        Err(WriteBackError::Store(self.exhausted("write")))
    }

    async fn drop_stale_copy(&self, id: &SessionId, source: usize, target: usize) {
        // A copy left on a higher backend would shadow the newer one once
        // that backend is reachable again.
        let tier = &self.tiers[source];
        match self.attempt(tier, tier.backend.remove(id)).await {
            Ok(_) => self.clear_stale(id, source),
            Err(e) => {
                tracing::warn!(
                    session_id = %id,
                    backend = tier.name(),
                    kept_on = self.tiers[target].name(),
                    error = %e,
                    "Stale session copy left behind"
                );
                if source < target {
                    self.mark_stale(id, source);
                }
            }
        }
    }

    /// Reads every reachable copy of a session with a known stale copy and
    /// returns the newest one. Outdated copies on marked backends are
    /// removed; a mark is cleared once its backend no longer holds one.
    async fn reconcile(
        &self,
        id: &SessionId,
        stale: &BTreeSet<usize>,
    ) -> Result<(usize, Session), SessionStoreError> {
        let mut copies: Vec<(usize, Session)> = Vec::new();
        let mut unreachable = false;
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.health.is_degraded() {
                unreachable = true;
                continue;
            }
            match self.attempt(tier, tier.backend.load(id)).await {
                Ok(Some(session)) => copies.push((index, session)),
                Ok(None) => self.clear_stale(id, index),
                Err(e) if e.is_unreachable() => unreachable = true,
                Err(e) => return Err(SessionStoreError::InvalidState(e.to_string())),
            }
        }

        let newest = copies
            .iter()
            .enumerate()
            .max_by_key(|(position, (_, session))| (session.version(), std::cmp::Reverse(*position)))
            .map(|(position, _)| position);
        let Some(newest) = newest else {
            return Err(if unreachable {
                self.exhausted("read")
            } else {
                SessionStoreError::NotFound(*id)
            });
        };
        let (source, session) = copies.swap_remove(newest);
        if stale.contains(&source) && unreachable {
            // The newer copy may sit on the backend we could not ask.
            tracing::warn!(session_id = %id, backend = self.tiers[source].name(), "Only an outdated session copy is reachable");
            return Err(self.exhausted("read"));
        }
        self.clear_stale(id, source);

        for (index, copy) in copies {
            if !stale.contains(&index) || copy.version() >= session.version() {
                continue;
            }
            let tier = &self.tiers[index];
            match self.attempt(tier, tier.backend.remove(id)).await {
                Ok(_) => {
                    tracing::info!(
                        session_id = %id,
                        backend = tier.name(),
                        stale_version = copy.version(),
                        version = session.version(),
                        "Removed outdated session copy"
                    );
                    self.clear_stale(id, index);
                }
                Err(e) => {
                    tracing::warn!(session_id = %id, backend = tier.name(), error = %e, "Outdated session copy still present");
                }
            }
        }
        Ok((source, session))
    }

    fn stale_copies(&self, id: &SessionId) -> BTreeSet<usize> {
        let stale = self.stale.lock().unwrap_or_else(PoisonError::into_inner);
        stale.get(id).cloned().unwrap_or_default()
    }

    fn mark_stale(&self, id: &SessionId, index: usize) {
        let mut stale = self.stale.lock().unwrap_or_else(PoisonError::into_inner);
        stale.entry(*id).or_default().insert(index);
    }

    fn clear_stale(&self, id: &SessionId, index: usize) {
        let mut stale = self.stale.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(marks) = stale.get_mut(id) {
            marks.remove(&index);
            if marks.is_empty() {
                stale.remove(id);
            }
        }
    }

    async fn live_sessions_of(&self, owner: &ClientId) -> Result<usize, SessionStoreError> {
        let mut ids = BTreeSet::new();
        let mut any_reachable = false;
        for tier in self.reachable() {
            match self.attempt(tier, tier.backend.list_by_owner(owner)).await {
                Ok(found) => {
                    any_reachable = true;
                    ids.extend(found);
                }
                Err(e) => {
                    tracing::warn!(owner_id = %owner, backend = tier.name(), error = %e, "Owner lookup skipped backend");
                }
            }
        }
        if !any_reachable {
            return Err(self.exhausted("list sessions"));
        }

        let now = self.clock.now();
        let mut live = 0;
        for id in ids {
            match self.locate(&id).await {
                Ok((index, session)) if session.is_expired(now) => {
                    let tier = &self.tiers[index];
                    match self.attempt(tier, tier.backend.remove(&id)).await {
                        Ok(_) => {
                            tracing::debug!(session_id = %id, owner_id = %owner, "Evicted expired session before create");
                        }
                        Err(e) => {
                            tracing::warn!(session_id = %id, owner_id = %owner, backend = tier.name(), error = %e, "Could not evict expired session before create");
                        }
                    }
                }
                Ok(_) => live += 1,
                Err(SessionStoreError::NotFound(_)) => {}
                // Unknown state counts against the cap.
                Err(_) => live += 1,
            }
        }
        Ok(live)
    }
}

enum WriteBackError {
    Conflict,
    Store(SessionStoreError),
}
