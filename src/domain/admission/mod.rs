//! Admission control - the token bucket policy behind rate limiting.

mod token_bucket;

pub use token_bucket::{BucketOutcome, BucketPolicy, TokenBucket};
