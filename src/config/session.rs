//! Session storage configuration

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::session_store::SessionStoreOptions;
use crate::domain::session::DEFAULT_TTL_SECONDS;

/// Session lifetime and failover behaviour
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle seconds before a session expires
    pub ttl_secs: u64,
    pub max_sessions_per_owner: usize,
    /// Upper bound on a single backend call
    pub backend_timeout_ms: u64,
    /// Consecutive failures before a backend is skipped
    pub degrade_after: u32,
    /// How long a degraded backend is skipped
    pub cool_down_secs: u64,
    /// Attempts at an update before reporting a concurrent modification
    pub max_update_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let options = SessionStoreOptions::default();
        Self {
            ttl_secs: DEFAULT_TTL_SECONDS,
            max_sessions_per_owner: options.max_sessions_per_owner,
            backend_timeout_ms: options.backend_timeout.as_millis() as u64,
            degrade_after: options.degrade_after,
            cool_down_secs: options.cool_down.as_secs(),
            max_update_attempts: options.max_update_attempts,
        }
    }
}

impl SessionConfig {
    pub fn store_options(&self) -> SessionStoreOptions {
        SessionStoreOptions {
            max_sessions_per_owner: self.max_sessions_per_owner,
            backend_timeout: Duration::from_millis(self.backend_timeout_ms),
            degrade_after: self.degrade_after,
            cool_down: Duration::from_secs(self.cool_down_secs),
            max_update_attempts: self.max_update_attempts,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ttl_secs == 0 {
            return Err(ValidationError::InvalidTimeout("session ttl"));
        }
        if self.backend_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout("session backend"));
        }
        if self.max_sessions_per_owner == 0 {
            return Err(ValidationError::MissingRequired("SESSION__MAX_SESSIONS_PER_OWNER"));
        }
        if self.degrade_after == 0 || self.max_update_attempts == 0 {
            return Err(ValidationError::InvalidSetting {
                section: "session",
                source: crate::domain::foundation::ValidationError::invalid_format(
                    "degrade_after/max_update_attempts",
                    "must be greater than zero",
                ),
            });
        }
        Ok(())
    }
}

/// Directory for the file-backed session backend
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileStoreConfig {
    pub dir: Option<PathBuf>,
}

impl FileStoreConfig {
    pub fn dir(&self) -> Option<&PathBuf> {
        self.dir.as_ref().filter(|d| !d.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_to_store_options() {
        let config = SessionConfig::default();
        assert_eq!(config.ttl_secs, 3600);
        assert_eq!(config.store_options(), SessionStoreOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let config = SessionConfig {
            ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_retry_bound_is_rejected() {
        let config = SessionConfig {
            max_update_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidSetting { section: "session", .. })
        ));
    }

    #[test]
    fn empty_file_store_dir_counts_as_unset() {
        let config = FileStoreConfig {
            dir: Some(PathBuf::new()),
        };
        assert!(config.dir().is_none());
    }
}
