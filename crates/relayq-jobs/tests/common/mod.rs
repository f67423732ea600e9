//! Shared harness for lifecycle tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use relayq_config::SweeperConfig;
use relayq_jobs::{
    BackingStore, EchoHandler, HandlerRegistry, JobDefaults, JobError, JobQueue, JobResult, LogEntry, MemoryStore,
    QueueKeys, RetryPolicy, Sweeper, WorkerPool, WorkerPoolConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Producer, sweepers and workers over one store, driven step by step.
pub struct Harness {
    pub store: Arc<dyn BackingStore>,
    pub queue: JobQueue,
    pub scheduler: Sweeper,
    pub retry_manager: Sweeper,
    pub workers: WorkerPool,
}

impl Harness {
    /// Memory store, zero retry backoff, non-blocking reads.
    pub async fn memory() -> (Arc<MemoryStore>, Self) {
        let store = Arc::new(MemoryStore::new());
        let harness = Self::with_store(store.clone(), JobDefaults::default()).await;
        (store, harness)
    }

    /// Memory store behind a `FlakyStore`.
    pub async fn flaky(defaults: JobDefaults) -> (Arc<MemoryStore>, Arc<FlakyStore>, Self) {
        let memory = Arc::new(MemoryStore::new());
        let flaky = Arc::new(FlakyStore::new(memory.clone()));
        let harness = Self::with_store(flaky.clone(), defaults).await;
        (memory, flaky, harness)
    }

    pub async fn with_store(store: Arc<dyn BackingStore>, defaults: JobDefaults) -> Self {
        let keys = QueueKeys::default();

        let mut registry = HandlerRegistry::new();
        registry
            .register("echo.process", EchoHandler::new(Duration::ZERO))
            .expect("register echo");

        let workers = WorkerPool::new(
            store.clone(),
            keys.clone(),
            registry,
            RetryPolicy::new(Duration::ZERO),
            WorkerPoolConfig {
                block_timeout: Duration::ZERO,
                ..WorkerPoolConfig::default()
            },
        );
        workers.ensure_group().await.expect("create consumer group");

        Self {
            queue: JobQueue::new(store.clone(), keys.clone(), defaults),
            scheduler: Sweeper::scheduler(store.clone(), keys.clone(), SweeperConfig::default()),
            retry_manager: Sweeper::retry_manager(store.clone(), keys, SweeperConfig::default()),
            workers,
            store,
        }
    }

    pub async fn status(&self, id: &str) -> std::collections::HashMap<String, String> {
        self.queue
            .status(id)
            .await
            .expect("status read")
            .expect("status record")
    }
}

fn injected(op: &str) -> JobError {
    JobError::Redis(redis::RedisError::from((redis::ErrorKind::IoError, "connection reset", op.to_string())))
}

/// Wraps a `MemoryStore` and fails chosen operations on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_hash_merge: AtomicBool,
    fail_set_add: AtomicBool,
    fail_set_remove: AtomicBool,
    fail_append_to: Mutex<Vec<String>>,
    remove_delay_ms: AtomicU64,
    merged_keys: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_status_writes(&self, fail: bool) {
        self.fail_hash_merge.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set_adds(&self, fail: bool) {
        self.fail_set_add.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set_removes(&self, fail: bool) {
        self.fail_set_remove.store(fail, Ordering::SeqCst);
    }

    pub fn fail_appends_to(&self, log: &str) {
        self.fail_append_to.lock().push(log.to_string());
    }

    /// Makes every `set_remove` wait before touching the set.
    pub fn delay_removes(&self, delay: Duration) {
        self.remove_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    /// Stops every injected failure and delay.
    pub fn heal(&self) {
        self.fail_status_writes(false);
        self.fail_set_adds(false);
        self.fail_set_removes(false);
        self.fail_append_to.lock().clear();
        self.remove_delay_ms.store(0, Ordering::SeqCst);
    }

    /// Keys of every successful hash write, in order.
    pub fn merged_keys(&self) -> Vec<String> {
        self.merged_keys.lock().clone()
    }
}

#[async_trait]
impl BackingStore for FlakyStore {
    async fn ensure_group(&self, log: &str, group: &str) -> JobResult<()> {
        self.inner.ensure_group(log, group).await
    }

    async fn append(&self, log: &str, fields: &[(&str, &str)]) -> JobResult<String> {
        if self.fail_append_to.lock().iter().any(|l| l == log) {
            return Err(injected("XADD"));
        }
        self.inner.append(log, fields).await
    }

    async fn read_group(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> JobResult<Vec<LogEntry>> {
        self.inner.read_group(log, group, consumer, block, count).await
    }

    async fn ack(&self, log: &str, group: &str, id: &str) -> JobResult<()> {
        self.inner.ack(log, group, id).await
    }

    async fn claim_stale(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> JobResult<Vec<LogEntry>> {
        self.inner.claim_stale(log, group, consumer, min_idle, count).await
    }

    async fn range_all(&self, log: &str) -> JobResult<Vec<LogEntry>> {
        self.inner.range_all(log).await
    }

    async fn set_add(&self, set: &str, score: i64, member: &str) -> JobResult<()> {
        if self.fail_set_add.load(Ordering::SeqCst) {
            return Err(injected("ZADD"));
        }
        self.inner.set_add(set, score, member).await
    }

    async fn set_range_by_score(&self, set: &str, max: i64, limit: usize) -> JobResult<Vec<String>> {
        self.inner.set_range_by_score(set, max, limit).await
    }

    async fn set_remove(&self, set: &str, member: &str) -> JobResult<bool> {
        let delay = self.remove_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_set_remove.load(Ordering::SeqCst) {
            return Err(injected("ZREM"));
        }
        self.inner.set_remove(set, member).await
    }

    async fn hash_merge(&self, key: &str, fields: &[(String, String)]) -> JobResult<()> {
        if self.fail_hash_merge.load(Ordering::SeqCst) {
            return Err(injected("HSET"));
        }
        self.inner.hash_merge(key, fields).await?;
        self.merged_keys.lock().push(key.to_string());
        Ok(())
    }

    async fn hash_read_all(&self, key: &str) -> JobResult<HashMap<String, String>> {
        self.inner.hash_read_all(key).await
    }

    async fn ping(&self) -> JobResult<()> {
        self.inner.ping().await
    }

    fn backend(&self) -> &'static str {
        "flaky"
    }
}
