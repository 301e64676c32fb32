//! Extraction and compliance endpoint configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::ai::HttpExtractorConfig;
use crate::adapters::compliance::HttpComplianceConfig;

/// An HTTP collaborator. Without a URL the collaborator is not configured.
#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorConfig {
    /// Endpoint URL
    pub url: Option<String>,

    /// Bearer token sent with every request
    pub api_key: Option<SecretString>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl CollaboratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.url().is_some()
    }

    fn api_key(&self) -> SecretString {
        self.api_key
            .clone()
            .unwrap_or_else(|| SecretString::new(String::new()))
    }

    pub fn extractor_config(&self) -> Option<HttpExtractorConfig> {
        self.url()
            .map(|url| HttpExtractorConfig::new(url, self.api_key()).with_timeout(self.timeout()))
    }

    pub fn compliance_config(&self) -> Option<HttpComplianceConfig> {
        self.url()
            .map(|url| HttpComplianceConfig::new(url, self.api_key()).with_timeout(self.timeout()))
    }

    /// Validate the collaborator. `name` is the section name used in errors.
    pub fn validate(&self, name: &'static str, production: bool) -> Result<(), ValidationError> {
        let Some(url) = self.url() else {
            if production {
                return Err(ValidationError::MissingRequired(name));
            }
            return Ok(());
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ValidationError::InvalidEndpointUrl(name));
        }
        if production && !url.starts_with("https://") {
            return Err(ValidationError::EndpointMustBeHttps(name));
        }
        if production
            && self
                .api_key
                .as_ref()
                .map_or(true, |k| k.expose_secret().is_empty())
        {
            return Err(ValidationError::MissingRequired(name));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout(name));
        }
        Ok(())
    }
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
