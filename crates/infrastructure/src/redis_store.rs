//! Redis-backed shared state store

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use scheduler_config::StateStoreConfig;
use scheduler_core::{SchedulerError, SchedulerResult, StateStore};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Removes and returns the lowest-scored member whose score is <= ARGV[1].
/// Runs server-side so concurrent schedulers never claim the same member.
const CLAIM_DUE_SCRIPT: &str = r#"
local items = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #items == 0 then
    return false
end
redis.call('ZREM', KEYS[1], items[1])
return items[1]
"#;

fn store_err(e: redis::RedisError) -> SchedulerError {
    SchedulerError::state_store(e.to_string())
}

/// Shared state store on top of a multiplexed Redis connection
pub struct RedisStateStore {
    conn: ConnectionManager,
    key_prefix: String,
    claim_script: Script,
}

impl RedisStateStore {
    /// Connect and verify the server answers PING
    pub async fn new(config: &StateStoreConfig) -> SchedulerResult<Self> {
        info!("Connecting to Redis state store at {}", config.url);

        let client = Client::open(config.url.as_str())
            .map_err(|e| SchedulerError::config_error(format!("Invalid Redis URL: {e}")))?;

        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let mut conn = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                SchedulerError::state_store(format!(
                    "Timed out connecting to Redis after {}s",
                    config.connection_timeout_seconds
                ))
            })?
            .map_err(store_err)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        info!("Redis state store connected (prefix: {})", config.key_prefix);

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            claim_script: Script::new(CLAIM_DUE_SCRIPT),
        })
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Build full key with prefix
    fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        redis::cmd("GET")
            .arg(self.build_key(key))
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn set(&self, key: &str, value: &str) -> SchedulerResult<()> {
        redis::cmd("SET")
            .arg(self.build_key(key))
            .arg(value)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn set_nx(&self, key: &str, value: &str) -> SchedulerResult<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.build_key(key))
            .arg(value)
            .arg("NX")
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> SchedulerResult<bool> {
        let removed: i64 = redis::cmd("DEL")
            .arg(self.build_key(key))
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    #[instrument(skip(self, value))]
    async fn lpush(&self, key: &str, value: &str) -> SchedulerResult<usize> {
        redis::cmd("LPUSH")
            .arg(self.build_key(key))
            .arg(value)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn rpop(&self, key: &str) -> SchedulerResult<Option<String>> {
        redis::cmd("RPOP")
            .arg(self.build_key(key))
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn llen(&self, key: &str) -> SchedulerResult<usize> {
        redis::cmd("LLEN")
            .arg(self.build_key(key))
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> SchedulerResult<Vec<String>> {
        redis::cmd("LRANGE")
            .arg(self.build_key(key))
            .arg(start)
            .arg(stop)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> SchedulerResult<()> {
        redis::cmd("LTRIM")
            .arg(self.build_key(key))
            .arg(start)
            .arg(stop)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    #[instrument(skip(self, member))]
    async fn zadd(&self, key: &str, member: &str, score: i64) -> SchedulerResult<()> {
        let _: i64 = redis::cmd("ZADD")
            .arg(self.build_key(key))
            .arg(score)
            .arg(member)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> SchedulerResult<usize> {
        redis::cmd("ZCARD")
            .arg(self.build_key(key))
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        max: i64,
        limit: usize,
    ) -> SchedulerResult<Vec<(String, i64)>> {
        let upper = if max == i64::MAX {
            "+inf".to_string()
        } else {
            max.to_string()
        };
        let entries: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.build_key(key))
            .arg("-inf")
            .arg(upper)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)?;
        Ok(entries
            .into_iter()
            .map(|(member, score)| (member, score as i64))
            .collect())
    }

    async fn claim_due(&self, key: &str, now: i64) -> SchedulerResult<Option<String>> {
        let claimed: Option<String> = self
            .claim_script
            .key(self.build_key(key))
            .arg(now)
            .invoke_async(&mut self.connection())
            .await
            .map_err(store_err)?;
        if claimed.is_some() {
            debug!("Claimed due member from {}", key);
        }
        Ok(claimed)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> SchedulerResult<()> {
        let _: i64 = redis::cmd("HSET")
            .arg(self.build_key(key))
            .arg(field)
            .arg(value)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> SchedulerResult<Option<String>> {
        redis::cmd("HGET")
            .arg(self.build_key(key))
            .arg(field)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> SchedulerResult<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        redis::cmd("HMGET")
            .arg(self.build_key(key))
            .arg(fields)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn hgetall(&self, key: &str) -> SchedulerResult<BTreeMap<String, String>> {
        redis::cmd("HGETALL")
            .arg(self.build_key(key))
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)
    }

    async fn hdel(&self, key: &str, field: &str) -> SchedulerResult<bool> {
        let removed: i64 = redis::cmd("HDEL")
            .arg(self.build_key(key))
            .arg(field)
            .query_async(&mut self.connection())
            .await
            .map_err(store_err)?;
        Ok(removed > 0)
    }
}
