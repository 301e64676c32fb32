//! Rate limiter adapters.
//!
//! Implementations of the RateLimiter port for different backends.
//!
//! ## Available Adapters
//!
//! - `InMemoryRateLimiter` - Per-instance token buckets
//! - `RedisRateLimiter` - Shared token buckets for multi-instance deployments
//! - `FallbackRateLimiter` - Shared store first, local buckets when it fails
//!
//! ## Usage
//!
//! ```ignore
//! use proposalos_core::adapters::rate_limiter::{
//!     FallbackRateLimiter, InMemoryRateLimiter, RateLimitConfig, RedisRateLimiter,
//! };
//!
//! // Single instance or tests
//! let limiter = InMemoryRateLimiter::from_config(&config, clock.clone())?;
//!
//! // Production
//! let limiter = FallbackRateLimiter::new(
//!     RedisRateLimiter::from_config(conn, &config)?,
//!     InMemoryRateLimiter::from_config(&config, clock.clone())?,
//!     &config,
//!     clock,
//! );
//! ```

mod config;
mod fallback;
mod in_memory;
mod redis;

pub use config::RateLimitConfig;
pub use fallback::FallbackRateLimiter;
pub use in_memory::InMemoryRateLimiter;
pub use redis::RedisRateLimiter;
