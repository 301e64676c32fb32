//! Compliance checker adapters.
//!
//! - `HttpComplianceChecker` - Compliance microservice over HTTP
//! - `MockComplianceChecker` - Scripted verdicts for tests

mod http_checker;
mod mock_checker;

pub use http_checker::{HttpComplianceChecker, HttpComplianceConfig};
pub use mock_checker::MockComplianceChecker;
