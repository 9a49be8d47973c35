use async_trait::async_trait;
use boxoffice_core::{Acquire, IdempotencyRegistry, LeaseToken, RegistryError, RegistryResult};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};

// KEYS[1] = record, ARGV = now_ms, lease_ms, retention_s, owner. Returns 1 when the caller owns the key.
const ACQUIRE_SCRIPT: &str = r#"
    local state = redis.call("HGET", KEYS[1], "state")
    if state == "applied" then
        return 0
    end
    if state == "pending" then
        local since = tonumber(redis.call("HGET", KEYS[1], "since") or "0")
        if tonumber(ARGV[1]) - since < tonumber(ARGV[2]) then
            return 0
        end
    end
    redis.call("HSET", KEYS[1], "state", "pending", "since", ARGV[1], "owner", ARGV[4])
    redis.call("EXPIRE", KEYS[1], ARGV[3])
    return 1
"#;

// KEYS[1] = record, ARGV = now_ms, retention_s, owner.
const MARK_APPLIED_SCRIPT: &str = r#"
    redis.call("HSET", KEYS[1], "state", "applied", "since", ARGV[1], "owner", ARGV[3])
    redis.call("EXPIRE", KEYS[1], ARGV[2])
    return 1
"#;

// KEYS[1] = record, ARGV = now_ms, owner. Returns 1 when the record moved to failed.
const MARK_FAILED_SCRIPT: &str = r#"
    if redis.call("HGET", KEYS[1], "state") ~= "pending" then
        return 0
    end
    if redis.call("HGET", KEYS[1], "owner") ~= ARGV[2] then
        return 0
    end
    redis.call("HSET", KEYS[1], "state", "failed", "since", ARGV[1])
    return 1
"#;

/// Inbound key registry shared by every API instance.
///
/// Each key is one hash `idem:{key}` with `state`, `since` and `owner` fields
/// and a TTL equal to the retention window. Every transition runs as a Lua
/// script so the read and the write are one step on the server.
#[derive(Clone)]
pub struct RedisIdempotencyRegistry {
    client: redis::Client,
    retention: Duration,
    pending_lease: Duration,
}

impl RedisIdempotencyRegistry {
    pub async fn new(connection_string: &str, retention: Duration, pending_lease: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        // Fail fast on a bad URL or unreachable server.
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        info!("Connected to Redis idempotency registry");

        Ok(Self {
            client,
            retention,
            pending_lease,
        })
    }

    fn record_key(key: &str) -> String {
        format!("idem:{}", key)
    }

    fn retention_seconds(&self) -> i64 {
        self.retention.as_secs().max(1) as i64
    }

    async fn connection(&self) -> RegistryResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }
}

fn backend(err: redis::RedisError) -> RegistryError {
    RegistryError::Backend(err.to_string())
}

#[async_trait]
impl IdempotencyRegistry for RedisIdempotencyRegistry {
    async fn try_acquire(&self, key: &str) -> RegistryResult<Acquire> {
        let mut conn = self.connection().await?;
        let token = LeaseToken::generate();

        let owned: i64 = redis::Script::new(ACQUIRE_SCRIPT)
            .key(Self::record_key(key))
            .arg(Utc::now().timestamp_millis())
            .arg(self.pending_lease.as_millis() as i64)
            .arg(self.retention_seconds())
            .arg(&token.0)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        Ok(if owned == 1 { Acquire::Fresh(token) } else { Acquire::AlreadySeen })
    }

    async fn mark_applied(&self, key: &str, token: &LeaseToken) -> RegistryResult<()> {
        let mut conn = self.connection().await?;

        redis::Script::new(MARK_APPLIED_SCRIPT)
            .key(Self::record_key(key))
            .arg(Utc::now().timestamp_millis())
            .arg(self.retention_seconds())
            .arg(&token.0)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(backend)?;

        debug!("Key {} marked applied", key);
        Ok(())
    }

    async fn mark_failed(&self, key: &str, token: &LeaseToken) -> RegistryResult<()> {
        let mut conn = self.connection().await?;

        let moved: i64 = redis::Script::new(MARK_FAILED_SCRIPT)
            .key(Self::record_key(key))
            .arg(Utc::now().timestamp_millis())
            .arg(&token.0)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        if moved == 1 {
            debug!("Key {} marked failed", key);
        } else {
            debug!("Key {} no longer held by {}, left unchanged", key, token);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_is_namespaced() {
        assert_eq!(RedisIdempotencyRegistry::record_key("t1"), "idem:t1");
    }

    #[test]
    fn test_script_checks_applied_before_lease() {
        let applied = ACQUIRE_SCRIPT.find("\"applied\"").unwrap();
        let lease = ACQUIRE_SCRIPT.find("ARGV[2]").unwrap();
        assert!(applied < lease);
    }

    #[test]
    fn test_mark_failed_is_fenced_on_pending_owner() {
        let pending = MARK_FAILED_SCRIPT.find("~= \"pending\"").unwrap();
        let owner = MARK_FAILED_SCRIPT.find("\"owner\") ~= ARGV[2]").unwrap();
        let write = MARK_FAILED_SCRIPT.find("\"failed\"").unwrap();
        assert!(pending < write && owner < write);
        assert!(!MARK_APPLIED_SCRIPT.contains("failed"));
    }
}
