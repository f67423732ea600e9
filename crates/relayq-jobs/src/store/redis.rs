//! Redis adapter: streams for the logs, sorted sets for the waiting sets,
//! hashes for status records.

use super::{BackingStore, LogEntry};
use crate::error::{JobError, JobResult};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::streams::{StreamAutoClaimReply, StreamId, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, FromRedisValue};
use relayq_config::RedisConfig;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Create a Redis connection pool and verify it with a PING.
pub async fn create_pool(config: &RedisConfig) -> JobResult<Pool> {
    info!(pool_size = config.pool_size, "Creating Redis connection pool...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .wait_timeout(Some(config.connect_timeout()))
        .create_timeout(Some(config.connect_timeout()))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create pool: {}", e)))?;

    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// `BackingStore` over a deadpool Redis pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn to_entry(stream_id: StreamId) -> LogEntry {
    let fields = stream_id
        .map
        .iter()
        .filter_map(|(k, v)| String::from_redis_value(v).ok().map(|v| (k.clone(), v)))
        .collect();
    LogEntry {
        id: stream_id.id,
        fields,
    }
}

fn millis(duration: Duration) -> usize {
    usize::try_from(duration.as_millis()).unwrap_or(usize::MAX)
}

#[async_trait]
impl BackingStore for RedisStore {
    async fn ensure_group(&self, log: &str, group: &str) -> JobResult<()> {
        let mut conn = self.pool.get().await?;
        let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(log, group, "0").await;
        match created {
            Ok(()) => {
                info!(log, group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(log, group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, log: &str, fields: &[(&str, &str)]) -> JobResult<String> {
        let mut conn = self.pool.get().await?;
        let id: String = conn.xadd(log, "*", fields).await?;
        Ok(id)
    }

    async fn read_group(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> JobResult<Vec<LogEntry>> {
        let mut conn = self.pool.get().await?;
        let mut opts = StreamReadOptions::default().group(group, consumer).count(count);
        if !block.is_zero() {
            opts = opts.block(millis(block));
        }

        let reply: Option<StreamReadReply> = conn.xread_options(&[log], &[">"], &opts).await?;

        Ok(reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).map(to_entry).collect())
            .unwrap_or_default())
    }

    async fn ack(&self, log: &str, group: &str, id: &str) -> JobResult<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.xack(log, group, &[id]).await?;
        Ok(())
    }

    async fn claim_stale(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> JobResult<Vec<LogEntry>> {
        let mut conn = self.pool.get().await?;
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(log)
            .arg(group)
            .arg(consumer)
            .arg(millis(min_idle))
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut *conn)
            .await?;

        Ok(reply.claimed.into_iter().map(to_entry).collect())
    }

    async fn range_all(&self, log: &str) -> JobResult<Vec<LogEntry>> {
        let mut conn = self.pool.get().await?;
        let reply: StreamRangeReply = conn.xrange_all(log).await?;
        Ok(reply.ids.into_iter().map(to_entry).collect())
    }

    async fn set_add(&self, set: &str, score: i64, member: &str) -> JobResult<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.zadd(set, member, score).await?;
        Ok(())
    }

    async fn set_range_by_score(&self, set: &str, max: i64, limit: usize) -> JobResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let count = isize::try_from(limit).unwrap_or(isize::MAX);
        let members: Vec<String> = conn.zrangebyscore_limit(set, "-inf", max, 0, count).await?;
        Ok(members)
    }

    async fn set_remove(&self, set: &str, member: &str) -> JobResult<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = conn.zrem(set, member).await?;
        Ok(removed > 0)
    }

    async fn hash_merge(&self, key: &str, fields: &[(String, String)]) -> JobResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hash_read_all(&self, key: &str) -> JobResult<HashMap<String, String>> {
        let mut conn = self.pool.get().await?;
        let record: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(record)
    }

    async fn ping(&self) -> JobResult<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
