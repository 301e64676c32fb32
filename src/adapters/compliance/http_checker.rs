//! HTTP client for the compliance microservice.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

use crate::ports::{ComplianceChecker, ComplianceError, ComplianceReport, ComplianceRequest};

#[derive(Debug, Clone)]
pub struct HttpComplianceConfig {
    pub endpoint: String,
    api_key: Secret<String>,
    pub timeout: Duration,
}

impl HttpComplianceConfig {
    pub fn new(endpoint: impl Into<String>, api_key: Secret<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpComplianceChecker {
    config: HttpComplianceConfig,
    client: Client,
}

impl HttpComplianceChecker {
    pub fn new(config: HttpComplianceConfig) -> Result<Self, ComplianceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ComplianceError::Unavailable(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ComplianceChecker for HttpComplianceChecker {
    async fn check(&self, request: &ComplianceRequest) -> Result<ComplianceReport, ComplianceError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ComplianceError::Timeout
                } else {
                    ComplianceError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ComplianceError::Unavailable(format!("Server error {}: {}", status, body))
            } else {
                ComplianceError::InvalidResponse(format!("Unexpected status {}: {}", status, body))
            });
        }

        response
            .json()
            .await
            .map_err(|e| ComplianceError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::SessionId;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn unreachable_service_is_transient() {
        let config = HttpComplianceConfig::new("http://127.0.0.1:1/check", Secret::new("k".into()))
            .with_timeout(Duration::from_secs(2));
        let checker = HttpComplianceChecker::new(config).unwrap();

        let err = checker
            .check(&ComplianceRequest {
                session_id: SessionId::new(),
                fields: BTreeMap::new(),
            })
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }
}
