//! Backing store contract and its adapters.
//!
//! The engine needs three primitives from its store: an append log with
//! consumer groups, score-ordered sets and hash records. `BackingStore`
//! names exactly those operations; `RedisStore` maps them onto Redis
//! streams, sorted sets and hashes, and `MemoryStore` keeps them in process.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::{create_pool, RedisStore};

use crate::error::JobResult;
use async_trait::async_trait;
use relayq_config::RedisConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One entry of an append log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl LogEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Store primitives used by the lifecycle engine.
///
/// Implementations are shared between every loop through an
/// `Arc<dyn BackingStore>`.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Creates the consumer group (and the log) if missing.
    async fn ensure_group(&self, log: &str, group: &str) -> JobResult<()>;

    /// Appends an entry and returns its id.
    async fn append(&self, log: &str, fields: &[(&str, &str)]) -> JobResult<String>;

    /// Reads up to `count` never-delivered entries for `consumer`, waiting
    /// at most `block` for one to arrive. An empty result means the wait
    /// elapsed. A zero `block` does not wait.
    async fn read_group(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> JobResult<Vec<LogEntry>>;

    /// Acknowledges a delivered entry.
    async fn ack(&self, log: &str, group: &str, id: &str) -> JobResult<()>;

    /// Transfers entries pending longer than `min_idle` to `consumer`.
    async fn claim_stale(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> JobResult<Vec<LogEntry>>;

    /// Every entry of a log, oldest first.
    async fn range_all(&self, log: &str) -> JobResult<Vec<LogEntry>>;

    /// Adds `member` with `score`, updating the score if already present.
    async fn set_add(&self, set: &str, score: i64, member: &str) -> JobResult<()>;

    /// Members with score `<= max`, ascending, at most `limit`.
    async fn set_range_by_score(&self, set: &str, max: i64, limit: usize) -> JobResult<Vec<String>>;

    /// Removes `member`. Returns whether it was present.
    async fn set_remove(&self, set: &str, member: &str) -> JobResult<bool>;

    /// Merges fields into a hash record, creating it if needed.
    async fn hash_merge(&self, key: &str, fields: &[(String, String)]) -> JobResult<()>;

    /// All fields of a hash record. Empty when the record does not exist.
    async fn hash_read_all(&self, key: &str) -> JobResult<HashMap<String, String>>;

    async fn ping(&self) -> JobResult<()>;

    /// Short adapter name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Opens the store named by `config.url`.
pub async fn connect(config: &RedisConfig) -> JobResult<Arc<dyn BackingStore>> {
    if config.is_memory() {
        tracing::warn!("Using in-process memory store; jobs are not shared or persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = create_pool(config).await?;
    Ok(Arc::new(RedisStore::new(pool)))
}
