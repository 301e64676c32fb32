//! Redis session backend, the first tier of the failover chain.
//!
//! Each session is a hash at `session:{id}` holding the JSON document, its
//! version and owner. Owners are indexed in the set `user_sessions:{owner}`.
//! Conditional writes run as one Lua script so the version check and the
//! write are atomic across instances.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use crate::domain::foundation::{ClientId, SessionId};
use crate::domain::session::Session;
use crate::ports::{BackendError, SessionBackend, WriteCondition};

const NAME: &str = "redis";
const SESSION_PREFIX: &str = "session:";
const OWNER_PREFIX: &str = "user_sessions:";

// KEYS[1] session hash, KEYS[2] owner set
// ARGV[1] mode (create | version | upsert), ARGV[2] expected version,
// ARGV[3] new version, ARGV[4] document, ARGV[5] owner, ARGV[6] expiry secs,
// ARGV[7] session id
// Returns 1 on write, 0 when the condition failed
const CONDITIONAL_WRITE_SCRIPT: &str = r#"
local mode = ARGV[1]
local stored = redis.call('HGET', KEYS[1], 'version')
if mode == 'create' then
  if stored then return 0 end
elseif mode == 'version' then
  if (not stored) or stored ~= ARGV[2] then return 0 end
end
redis.call('HSET', KEYS[1], 'version', ARGV[3], 'doc', ARGV[4], 'owner', ARGV[5])
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[6]))
redis.call('SADD', KEYS[2], ARGV[7])
return 1
"#;

// KEYS[1] session hash; ARGV[1] owner set prefix, ARGV[2] session id
const REMOVE_SCRIPT: &str = r#"
local owner = redis.call('HGET', KEYS[1], 'owner')
local removed = redis.call('DEL', KEYS[1])
if owner then
  redis.call('SREM', ARGV[1] .. owner, ARGV[2])
end
return removed
"#;

fn session_key(id: &SessionId) -> String {
    format!("{}{}", SESSION_PREFIX, id)
}

fn owner_key(owner: &ClientId) -> String {
    format!("{}{}", OWNER_PREFIX, owner)
}

fn redis_error(e: redis::RedisError) -> BackendError {
    BackendError::unavailable(NAME, e)
}

/// Session documents in a shared Redis.
#[derive(Clone)]
pub struct RedisSessionBackend {
    conn: MultiplexedConnection,
    write_script: Script,
    remove_script: Script,
}

impl RedisSessionBackend {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            write_script: Script::new(CONDITIONAL_WRITE_SCRIPT),
            remove_script: Script::new(REMOVE_SCRIPT),
        }
    }
}

/// Records outlive their TTL so an expired session can still be reported
/// as expired rather than missing.
fn key_expiry_secs(session: &Session) -> u64 {
    session.ttl_seconds().saturating_mul(2).max(1)
}

#[async_trait]
impl SessionBackend for RedisSessionBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, BackendError> {
        let mut conn = self.conn.clone();
        let doc: Option<String> = conn
            .hget(session_key(id), "doc")
            .await
            .map_err(redis_error)?;
        doc.map(|doc| {
            serde_json::from_str(&doc).map_err(|e| BackendError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn store(&self, session: &Session, condition: WriteCondition) -> Result<(), BackendError> {
        let doc = serde_json::to_string(session)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        let (mode, expected) = match condition {
            WriteCondition::Create => ("create", 0),
            WriteCondition::Version(v) => ("version", v),
            WriteCondition::Upsert => ("upsert", 0),
        };

        let mut conn = self.conn.clone();
        let written: i64 = self
            .write_script
            .key(session_key(&session.id()))
            .key(owner_key(session.owner_id()))
            .arg(mode)
            .arg(expected.to_string())
            .arg(session.version().to_string())
            .arg(doc)
            .arg(session.owner_id().as_str())
            .arg(key_expiry_secs(session))
            .arg(session.id().to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;

        if written == 1 {
            Ok(())
        } else {
            Err(BackendError::VersionConflict(session.id()))
        }
    }

    async fn remove(&self, id: &SessionId) -> Result<bool, BackendError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .remove_script
            .key(session_key(id))
            .arg(OWNER_PREFIX)
            .arg(id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(removed > 0)
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, BackendError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<'_, String> = conn
                .scan_match(format!("{}*", SESSION_PREFIX))
                .await
                .map_err(redis_error)?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(SESSION_PREFIX))
            .filter_map(|id| id.parse().ok())
            .collect())
    }

    async fn list_by_owner(&self, owner: &ClientId) -> Result<Vec<SessionId>, BackendError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(owner_key(owner)).await.map_err(redis_error)?;

        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            let Ok(id) = member.parse::<SessionId>() else {
                continue;
            };
            let exists: bool = conn.exists(session_key(&id)).await.map_err(redis_error)?;
            if exists {
                ids.push(id);
            } else {
                // Hash expired on its own; drop the dangling index entry.
                let _: i64 = conn
                    .srem(owner_key(owner), &member)
                    .await
                    .map_err(redis_error)?;
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    #[test]
    fn keys_are_namespaced() {
        let id = SessionId::new();
        assert_eq!(session_key(&id), format!("session:{}", id));
        assert_eq!(
            owner_key(&ClientId::new("acme").unwrap()),
            "user_sessions:acme"
        );
    }

    #[test]
    fn key_expiry_is_twice_the_ttl() {
        let s = Session::new(
            SessionId::new(),
            ClientId::new("acme").unwrap(),
            ["origin_city"],
            3600,
            Timestamp::now(),
        );
        assert_eq!(key_expiry_secs(&s), 7200);
    }
}
