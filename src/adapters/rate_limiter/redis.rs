//! Redis-backed token bucket rate limiter for multi-instance deployments.
//!
//! The refill-and-take step runs as one Lua script, so every instance sees
//! the same bucket. Time comes from the Redis server clock to keep instances
//! with skewed clocks consistent.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::time::Duration;

use crate::domain::admission::BucketPolicy;
use crate::domain::foundation::{ClientId, ValidationError};
use crate::ports::{
    bucket_key, RateLimitDecision, RateLimitError, RateLimitStatus, RateLimiter,
};

use super::config::RateLimitConfig;

// KEYS[1] bucket key
// ARGV[1] capacity, ARGV[2] refill per ms, ARGV[3] tokens requested (0 = peek),
// ARGV[4] idle expiry in ms
// Returns {allowed, tokens (string), retry_after_ms}
const TOKEN_BUCKET_SCRIPT: &str = r#"
local capacity = tonumber(ARGV[1])
local refill_per_ms = tonumber(ARGV[2])
local requested = tonumber(ARGV[3])
local idle_ms = tonumber(ARGV[4])

local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)

local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil then
  tokens = capacity
  ts = now
end
if now > ts then
  tokens = math.min(capacity, tokens + (now - ts) * refill_per_ms)
  ts = now
end

local allowed = 1
if requested > 0 then
  if tokens + 1e-9 >= requested then
    tokens = math.max(0, tokens - requested)
  else
    allowed = 0
  end
  redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(ts))
  redis.call('PEXPIRE', KEYS[1], idle_ms)
end

local retry_ms = 0
if allowed == 0 then
  retry_ms = math.ceil((1 - tokens) / refill_per_ms)
end
return {allowed, tostring(tokens), retry_ms}
"#;

/// Shared token buckets in Redis.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
    policy: BucketPolicy,
    idle_expiry: Duration,
    script: Script,
}

impl RedisRateLimiter {
    pub fn new(conn: MultiplexedConnection, policy: BucketPolicy, idle_expiry: Duration) -> Self {
        Self {
            conn,
            policy,
            idle_expiry,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }

    pub fn from_config(conn: MultiplexedConnection, config: &RateLimitConfig) -> Result<Self, ValidationError> {
        Ok(Self::new(conn, config.policy()?, config.idle_expiry()))
    }

    async fn run(&self, client: &ClientId, requested: u32) -> Result<(bool, f64, Duration), RateLimitError> {
        let mut conn = self.conn.clone();
        let (allowed, tokens, retry_ms): (i64, String, i64) = self
            .script
            .key(bucket_key(client))
            .arg(self.policy.capacity())
            .arg(self.policy.refill_per_sec() / 1000.0)
            .arg(requested)
            .arg(self.idle_expiry.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| RateLimitError::Unavailable(e.to_string()))?;

        let tokens: f64 = tokens
            .parse()
            .map_err(|_| RateLimitError::Unavailable(format!("malformed token count '{}'", tokens)))?;
        Ok((allowed == 1, tokens, Duration::from_millis(retry_ms.max(0) as u64)))
    }
}

fn whole(tokens: f64) -> u32 {
    (tokens + 1e-9).floor().max(0.0) as u32
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, client: &ClientId) -> Result<RateLimitDecision, RateLimitError> {
        let (allowed, tokens, retry_after) = self.run(client, 1).await?;
        let capacity = self.policy.capacity();
        Ok(if allowed {
            RateLimitDecision::allowed(capacity, whole(tokens))
        } else {
            RateLimitDecision::denied(capacity, retry_after.max(Duration::from_millis(1)))
        })
    }

    async fn status(&self, client: &ClientId) -> Result<RateLimitStatus, RateLimitError> {
        let (_, tokens, _) = self.run(client, 0).await?;
        Ok(RateLimitStatus {
            limit: self.policy.capacity(),
            remaining: whole(tokens),
        })
    }

    async fn reset(&self, client: &ClientId) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(bucket_key(client))
            .await
            .map_err(|e: redis::RedisError| RateLimitError::Unavailable(e.to_string()))
    }
}
