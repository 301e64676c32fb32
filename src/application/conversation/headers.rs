//! Rate limit headers for the inbound turn API.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::ports::RateLimitDecision;

/// Standard rate limit header names.
pub mod names {
    use super::HeaderName;

    /// Bucket capacity.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Whole tokens left.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// Seconds until a denied client may retry.
    pub static RETRY_AFTER: HeaderName = HeaderName::from_static("retry-after");
}

/// Headers describing an admission decision. `retry-after` only on denial.
pub fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        names::X_RATELIMIT_LIMIT.clone(),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        names::X_RATELIMIT_REMAINING.clone(),
        HeaderValue::from(decision.remaining),
    );
    if !decision.allowed {
        headers.insert(
            names::RETRY_AFTER.clone(),
            HeaderValue::from(decision.retry_after_secs()),
        );
    }
    headers
}
