//! Fact extractor port - the language-model collaborator that reads the
//! conversation and proposes field values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::session::Turn;

/// What the extractor is given.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest {
    /// Recent conversation history, oldest first, ending with the user's turn.
    pub history: Vec<Turn>,
    /// Required fields still missing, in asking order.
    pub missing_fields: Vec<String>,
}

/// One proposed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: String,
    pub confidence: f64,
}

impl ExtractedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            confidence,
        }
    }
}

/// Everything the extractor proposed for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub fields: Vec<ExtractedField>,
}

/// Errors from the extraction collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("extraction timed out")]
    Timeout,

    #[error("extractor unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited by extractor")]
    RateLimited,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request rejected: {0}")]
    InvalidRequest(String),
}

impl ExtractionError {
    /// True for failures that count against the extractor's breaker.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExtractionError::Network(_)
                | ExtractionError::Timeout
                | ExtractionError::Unavailable(_)
                | ExtractionError::RateLimited
        )
    }
}

/// Port for the model-backed fact extractor.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_classified() {
        assert!(ExtractionError::Timeout.is_transient());
        assert!(ExtractionError::Network("reset".into()).is_transient());
        assert!(!ExtractionError::InvalidResponse("not json".into()).is_transient());
        assert!(!ExtractionError::InvalidRequest("too long".into()).is_transient());
    }

    #[test]
    fn result_deserializes_from_wire_shape() {
        let json = r#"{"fields":[{"name":"origin_city","value":"Denver","confidence":0.92}]}"#;
        let result: ExtractionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.fields, vec![ExtractedField::new("origin_city", "Denver", 0.92)]);
    }
}
