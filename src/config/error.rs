//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid timeout for {0}")]
    InvalidTimeout(&'static str),

    #[error("Invalid sweep interval")]
    InvalidSweepInterval,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool size must be between 1 and 100")]
    InvalidPoolSize,

    #[error("Invalid endpoint URL for {0}")]
    InvalidEndpointUrl(&'static str),

    #[error("Endpoint for {0} must use HTTPS in production")]
    EndpointMustBeHttps(&'static str),

    #[error("Failure threshold for {0} must be at least 1")]
    InvalidFailureThreshold(&'static str),

    #[error("At least one required field must be configured")]
    NoRequiredFields,

    #[error("Invalid {section} settings: {source}")]
    InvalidSetting {
        section: &'static str,
        #[source]
        source: crate::domain::foundation::ValidationError,
    },
}

impl ValidationError {
    pub(crate) fn setting(
        section: &'static str,
    ) -> impl FnOnce(crate::domain::foundation::ValidationError) -> Self {
        move |source| ValidationError::InvalidSetting { section, source }
    }
}
