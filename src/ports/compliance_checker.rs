//! Compliance checker port - the microservice that reviews a completed
//! Basis of Estimate before export.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::foundation::SessionId;

/// Field values submitted for review.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceRequest {
    pub session_id: SessionId,
    pub fields: BTreeMap<String, String>,
}

/// Verdict of the compliance service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub passed: bool,
    #[serde(default)]
    pub findings: Vec<String>,
}

/// Errors from the compliance collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComplianceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("compliance check timed out")]
    Timeout,

    #[error("compliance service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ComplianceError {
    /// True for failures that count against the compliance breaker.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ComplianceError::InvalidResponse(_))
    }
}

/// Port for the compliance microservice.
#[async_trait]
pub trait ComplianceChecker: Send + Sync {
    async fn check(&self, request: &ComplianceRequest) -> Result<ComplianceReport, ComplianceError>;
}
