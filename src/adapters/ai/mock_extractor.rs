//! Mock fact extractor for testing.
//!
//! # Features
//!
//! - Queued responses, consumed in order (an empty queue yields no fields)
//! - Simulated latency for timeout testing
//! - Error injection for breaker testing
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let extractor = MockFactExtractor::new()
//!     .with_fields(vec![ExtractedField::new("origin_city", "Denver", 0.9)])
//!     .with_error(ExtractionError::Timeout);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    ExtractedField, ExtractionError, ExtractionRequest, ExtractionResult, FactExtractor,
};

#[derive(Debug, Clone)]
enum MockResponse {
    Success(ExtractionResult),
    Error(ExtractionError),
}

#[derive(Debug, Clone, Default)]
pub struct MockFactExtractor {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    delay: Duration,
    calls: Arc<Mutex<Vec<ExtractionRequest>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockFactExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful extraction.
    pub fn with_fields(self, fields: Vec<ExtractedField>) -> Self {
        self.push_fields(fields);
        self
    }

    /// Queues a failure.
    pub fn with_error(self, error: ExtractionError) -> Self {
        self.push_error(error);
        self
    }

    /// Sets simulated latency for every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues a successful extraction on a shared handle.
    pub fn push_fields(&self, fields: Vec<ExtractedField>) {
        lock(&self.responses).push_back(MockResponse::Success(ExtractionResult { fields }));
    }

    /// Queues a failure on a shared handle.
    pub fn push_error(&self, error: ExtractionError) {
        lock(&self.responses).push_back(MockResponse::Error(error));
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<ExtractionRequest> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl FactExtractor for MockFactExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, ExtractionError> {
        lock(&self.calls).push(request.clone());
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let next = lock(&self.responses).pop_front();
        match next {
            Some(MockResponse::Success(result)) => Ok(result),
            Some(MockResponse::Error(e)) => Err(e),
            None => Ok(ExtractionResult::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            history: Vec::new(),
            missing_fields: vec!["origin_city".into()],
        }
    }

    #[tokio::test]
    async fn returns_queued_responses_in_order() {
        let extractor = MockFactExtractor::new()
            .with_fields(vec![ExtractedField::new("origin_city", "Denver", 0.9)])
            .with_error(ExtractionError::Timeout);

        let first = extractor.extract(&request()).await.unwrap();
        assert_eq!(first.fields[0].value, "Denver");
        assert_eq!(extractor.extract(&request()).await.unwrap_err(), ExtractionError::Timeout);
        assert!(extractor.extract(&request()).await.unwrap().fields.is_empty());
        assert_eq!(extractor.call_count(), 3);
    }

    #[tokio::test]
    async fn clones_share_the_queue() {
        let extractor = MockFactExtractor::new();
        let handle = extractor.clone();
        handle.push_fields(vec![ExtractedField::new("origin_city", "Austin", 0.8)]);

        let result = extractor.extract(&request()).await.unwrap();
        assert_eq!(result.fields.len(), 1);
        assert_eq!(handle.calls().len(), 1);
    }
}
