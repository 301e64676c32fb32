//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `PROPOSALOS` prefix and nested values use double underscores as separators.
//! Every section has defaults, so an empty environment yields a local setup
//! running on the in-memory backends.
//!
//! # Example
//!
//! ```no_run
//! use proposalos_core::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Sweeping every {:?}", config.server.sweep_interval());
//! ```

mod breakers;
mod collaborators;
mod conversation;
mod database;
mod error;
mod redis;
mod server;
mod session;

pub use breakers::{BreakerSettings, BreakersConfig};
pub use collaborators::CollaboratorConfig;
pub use conversation::ConversationConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};
pub use session::{FileStoreConfig, SessionConfig};

pub use crate::adapters::rate_limiter::RateLimitConfig;

use serde::Deserialize;

use crate::application::conversation::ConversationSettings;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Environment, log filter and sweep interval
    pub server: ServerConfig,

    /// Redis (shared rate limiter, primary session backend)
    pub redis: RedisConfig,

    /// PostgreSQL (secondary session backend)
    pub database: DatabaseConfig,

    /// Directory-backed secondary session backend
    pub file_store: FileStoreConfig,

    /// Per-client token bucket
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker thresholds per dependency
    pub breakers: BreakersConfig,

    /// Session lifetime and failover chain
    pub session: SessionConfig,

    /// Required fields and confidence thresholds
    pub conversation: ConversationConfig,

    /// Fact extraction endpoint
    pub extractor: CollaboratorConfig,

    /// Compliance microservice
    pub compliance: CollaboratorConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `PROPOSALOS` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `PROPOSALOS__REDIS__URL=redis://...` -> `redis.url`
    /// - `PROPOSALOS__BREAKERS__COMPLIANCE__FAILURE_THRESHOLD=5`
    /// - `PROPOSALOS__CONVERSATION__REQUIRED_FIELDS=origin_city,destination_city`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("PROPOSALOS")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("conversation.required_fields"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load and validate in one step
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Production additionally requires both collaborators over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let production = self.is_production();
        self.server.validate()?;
        self.redis.validate()?;
        self.database.validate()?;
        self.rate_limit
            .validate()
            .map_err(ValidationError::setting("rate_limit"))?;
        self.breakers.validate()?;
        self.session.validate()?;
        self.conversation.validate()?;
        self.extractor.validate("extractor", production)?;
        self.compliance.validate("compliance", production)?;
        Ok(())
    }

    /// Dialogue settings derived from the conversation and session sections
    pub fn conversation_settings(&self) -> Result<ConversationSettings, ValidationError> {
        self.conversation.settings(self.session.ttl_secs)
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
