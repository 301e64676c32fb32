//! Fact extractor adapters.
//!
//! - `HttpFactExtractor` - Model-backed extraction service over HTTP
//! - `MockFactExtractor` - Scripted responses for tests

mod http_extractor;
mod mock_extractor;

pub use http_extractor::{HttpExtractorConfig, HttpFactExtractor};
pub use mock_extractor::MockFactExtractor;
