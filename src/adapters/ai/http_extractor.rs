//! HTTP fact extractor - calls the model-backed extraction endpoint.
//!
//! # Configuration
//!
//! ```ignore
//! let config = HttpExtractorConfig::new("https://extractor.internal/v1/extract", api_key)
//!     .with_timeout(Duration::from_secs(20));
//!
//! let extractor = HttpFactExtractor::new(config)?;
//! ```
//!
//! The endpoint receives `{"history": [...], "missing_fields": [...]}` and
//! answers `{"fields": [{"name", "value", "confidence"}]}`.

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

use crate::ports::{ExtractionError, ExtractionRequest, ExtractionResult, FactExtractor};

/// Configuration for the HTTP extractor.
#[derive(Debug, Clone)]
pub struct HttpExtractorConfig {
    pub endpoint: String,
    api_key: Secret<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl HttpExtractorConfig {
    pub fn new(endpoint: impl Into<String>, api_key: Secret<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

pub struct HttpFactExtractor {
    config: HttpExtractorConfig,
    client: Client,
}

impl HttpFactExtractor {
    pub fn new(config: HttpExtractorConfig) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExtractionError::InvalidRequest(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { config, client })
    }

    async fn send(&self, request: &ExtractionRequest) -> Result<Response, ExtractionError> {
        self.client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractionError::Timeout
                } else if e.is_connect() {
                    ExtractionError::Network(format!("Connection failed: {}", e))
                } else {
                    ExtractionError::Network(e.to_string())
                }
            })
    }

    async fn check_status(response: Response) -> Result<Response, ExtractionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            429 => ExtractionError::RateLimited,
            400 | 413 | 422 => ExtractionError::InvalidRequest(body),
            // A rejected key will not fix itself; let the breaker stop the calls.
            401 | 403 => ExtractionError::Unavailable(format!("authentication failed ({})", status)),
            500..=599 => ExtractionError::Unavailable(format!("Server error {}: {}", status, body)),
            _ => ExtractionError::Network(format!("Unexpected status {}: {}", status, body)),
        })
    }
}

#[async_trait]
impl FactExtractor for HttpFactExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, ExtractionError> {
        let response = Self::check_status(self.send(request).await?).await?;
        let result: ExtractionResult = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        tracing::debug!(
            proposed = result.fields.len(),
            missing = request.missing_fields.len(),
            "Extraction response received"
        );
        Ok(result)
    }
}
