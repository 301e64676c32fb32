//! Mock compliance checker for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ports::{ComplianceChecker, ComplianceError, ComplianceReport, ComplianceRequest};

/// Returns queued verdicts in order; passes when the queue is empty.
#[derive(Debug, Clone, Default)]
pub struct MockComplianceChecker {
    responses: Arc<Mutex<VecDeque<Result<ComplianceReport, ComplianceError>>>>,
    calls: Arc<Mutex<Vec<ComplianceRequest>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockComplianceChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_findings(self, findings: Vec<String>) -> Self {
        lock(&self.responses).push_back(Ok(ComplianceReport {
            passed: false,
            findings,
        }));
        self
    }

    pub fn with_error(self, error: ComplianceError) -> Self {
        self.push_error(error);
        self
    }

    pub fn push_error(&self, error: ComplianceError) {
        lock(&self.responses).push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls(&self) -> Vec<ComplianceRequest> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ComplianceChecker for MockComplianceChecker {
    async fn check(&self, request: &ComplianceRequest) -> Result<ComplianceReport, ComplianceError> {
        lock(&self.calls).push(request.clone());
        let next = lock(&self.responses).pop_front();
        next.unwrap_or(Ok(ComplianceReport {
            passed: true,
            findings: Vec::new(),
        }))
    }
}
