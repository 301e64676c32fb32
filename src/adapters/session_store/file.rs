//! File-backed session backend.
//!
//! One YAML document per session under a base directory. Writes go to a
//! temporary file and are renamed into place; an in-process lock makes the
//! version check and the write atomic for this instance.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use crate::domain::foundation::{ClientId, SessionId};
use crate::domain::session::Session;
use crate::ports::{BackendError, SessionBackend, WriteCondition};

const NAME: &str = "file";

/// Session documents stored as `<base>/<session_id>.yaml`.
#[derive(Debug)]
pub struct FileSessionBackend {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionBackend {
    /// # Example
    /// ```ignore
    /// let backend = FileSessionBackend::new("./data/sessions");
    /// ```
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.base_path.join(format!("{}.yaml", id))
    }

    fn io_error(e: std::io::Error) -> BackendError {
        BackendError::unavailable(NAME, e)
    }

    async fn read(&self, id: &SessionId) -> Result<Option<Session>, BackendError> {
        let yaml = match fs::read_to_string(self.path_for(id)).await {
            Ok(yaml) => yaml,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(e)),
        };
        serde_yaml::from_str(&yaml)
            .map(Some)
            .map_err(|e| BackendError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl SessionBackend for FileSessionBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, BackendError> {
        self.read(id).await
    }

    async fn store(&self, session: &Session, condition: WriteCondition) -> Result<(), BackendError> {
        let yaml = serde_yaml::to_string(session)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        let stored = self.read(&session.id()).await?.map(|s| s.version());
        if !condition.permits(stored) {
            return Err(BackendError::VersionConflict(session.id()));
        }

        fs::create_dir_all(&self.base_path).await.map_err(Self::io_error)?;
        let target = self.path_for(&session.id());
        let tmp = target.with_extension("yaml.tmp");
        fs::write(&tmp, yaml).await.map_err(Self::io_error)?;
        fs::rename(&tmp, &target).await.map_err(Self::io_error)?;
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> Result<bool, BackendError> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(e)),
        }
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, BackendError> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Self::io_error)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<SessionId>().ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn list_by_owner(&self, owner: &ClientId) -> Result<Vec<SessionId>, BackendError> {
        let mut owned = Vec::new();
        for id in self.list_ids().await? {
            match self.read(&id).await {
                Ok(Some(session)) if session.owner_id() == owner => owned.push(id),
                Ok(_) => {}
                Err(BackendError::Serialization(e)) => {
                    tracing::warn!(session_id = %id, error = %e, "Skipping unreadable session file");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use crate::domain::session::FieldSource;
    use tempfile::TempDir;

    fn session(owner: &str) -> Session {
        Session::new(
            SessionId::new(),
            ClientId::new(owner).unwrap(),
            ["origin_city", "destination_city"],
            3600,
            Timestamp::now(),
        )
    }

    fn backend() -> (FileSessionBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        (FileSessionBackend::new(dir.path().join("sessions")), dir)
    }

    #[tokio::test]
    async fn roundtrips_full_document() {
        let (backend, _dir) = backend();
        let mut s = session("owner");
        s.record_user_value("origin_city", "Denver", FieldSource::UserStatement, Timestamp::now());

        backend.store(&s, WriteCondition::Create).await.unwrap();

        assert_eq!(backend.load(&s.id()).await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let (backend, _dir) = backend();
        assert_eq!(backend.load(&SessionId::new()).await.unwrap(), None);
        assert!(backend.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn versioned_write_rejects_stale_version() {
        let (backend, _dir) = backend();
        let mut s = session("owner");
        backend.store(&s, WriteCondition::Create).await.unwrap();
        s.set_version(1);
        backend.store(&s, WriteCondition::Version(0)).await.unwrap();

        let err = backend.store(&s, WriteCondition::Version(0)).await.unwrap_err();
        assert!(matches!(err, BackendError::VersionConflict(_)));
    }

    #[tokio::test]
    async fn lists_ids_and_owners() {
        let (backend, _dir) = backend();
        let a = session("alice");
        let b = session("bob");
        backend.store(&a, WriteCondition::Create).await.unwrap();
        backend.store(&b, WriteCondition::Create).await.unwrap();

        let mut ids = backend.list_ids().await.unwrap();
        ids.sort();
        let mut expected = vec![a.id(), b.id()];
        expected.sort();
        assert_eq!(ids, expected);

        let owned = backend.list_by_owner(&ClientId::new("bob").unwrap()).await.unwrap();
        assert_eq!(owned, vec![b.id()]);
    }

    #[tokio::test]
    async fn remove_deletes_file() {
        let (backend, _dir) = backend();
        let s = session("owner");
        backend.store(&s, WriteCondition::Create).await.unwrap();

        assert!(backend.remove(&s.id()).await.unwrap());
        assert!(!backend.remove(&s.id()).await.unwrap());
        assert_eq!(backend.load(&s.id()).await.unwrap(), None);
    }
}
