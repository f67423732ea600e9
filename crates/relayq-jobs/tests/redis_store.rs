//! Integration tests for the Redis adapter.
//!
//! These tests run against a real Redis server using testcontainers.
//! Requires Docker; run with `--ignored`.

mod common;

use common::Harness;
use relayq_config::RedisConfig;
use relayq_jobs::store::{create_pool, RedisStore};
use relayq_jobs::{now_unix, BackingStore, JobDefaults, JobPayload};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::Redis;

struct TestRedis {
    _container: ContainerAsync<Redis>,
    store: Arc<RedisStore>,
}

impl TestRedis {
    async fn new() -> Self {
        let container = Redis::default()
            .start()
            .await
            .expect("Failed to start Redis container");
        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        let config = RedisConfig {
            url: format!("redis://127.0.0.1:{}/0", port),
            pool_size: 4,
            ..RedisConfig::default()
        };
        let pool = create_pool(&config).await.expect("Failed to connect to Redis");

        Self {
            _container: container,
            store: Arc::new(RedisStore::new(pool)),
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_group_delivery_and_ack() {
    let redis = TestRedis::new().await;
    let store = redis.store.clone();

    store.ensure_group("jobs:stream", "jobs:cg").await.unwrap();
    // A second call hits BUSYGROUP and is ignored.
    store.ensure_group("jobs:stream", "jobs:cg").await.unwrap();

    store.append("jobs:stream", &[("job", "a")]).await.unwrap();
    store.append("jobs:stream", &[("job", "b")]).await.unwrap();

    let first = store
        .read_group("jobs:stream", "jobs:cg", "c1", Duration::from_millis(100), 1)
        .await
        .unwrap();
    let second = store
        .read_group("jobs:stream", "jobs:cg", "c2", Duration::from_millis(100), 1)
        .await
        .unwrap();
    assert_eq!(first[0].field("job"), Some("a"));
    assert_eq!(second[0].field("job"), Some("b"));

    store.ack("jobs:stream", "jobs:cg", &first[0].id).await.unwrap();

    let empty = store
        .read_group("jobs:stream", "jobs:cg", "c1", Duration::from_millis(100), 1)
        .await
        .unwrap();
    assert!(empty.is_empty());

    let claimed = store
        .claim_stale("jobs:stream", "jobs:cg", "c3", Duration::ZERO, 10)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, second[0].id);
}

#[tokio::test]
#[ignore]
async fn test_sorted_set_and_hash() {
    let redis = TestRedis::new().await;
    let store = redis.store.clone();

    store.set_add("jobs:retry", 20, "late").await.unwrap();
    store.set_add("jobs:retry", 10, "early").await.unwrap();
    assert_eq!(
        store.set_range_by_score("jobs:retry", 15, 10).await.unwrap(),
        vec!["early".to_string()]
    );
    assert!(store.set_remove("jobs:retry", "early").await.unwrap());
    assert!(!store.set_remove("jobs:retry", "early").await.unwrap());

    store
        .hash_merge("jobs:job:1", &[("status".to_string(), "queued".to_string())])
        .await
        .unwrap();
    store
        .hash_merge("jobs:job:1", &[("attempts".to_string(), "2".to_string())])
        .await
        .unwrap();
    let record = store.hash_read_all("jobs:job:1").await.unwrap();
    assert_eq!(record["status"], "queued");
    assert_eq!(record["attempts"], "2");
    assert!(store.hash_read_all("jobs:job:missing").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_lifecycle_on_redis() {
    let redis = TestRedis::new().await;
    let h = Harness::with_store(redis.store.clone(), JobDefaults::default()).await;

    let ok = h.queue.enqueue("echo.process", JobPayload::default(), None).await.unwrap();
    let bad = h.queue.enqueue("unknown.x", JobPayload::default(), None).await.unwrap();

    for _ in 0..5 {
        h.workers.poll_once("worker-0").await.unwrap();
        h.workers.poll_once("worker-0").await.unwrap();
        h.retry_manager.sweep_once(now_unix() + 1).await.unwrap();
    }

    assert_eq!(h.status(ok.as_str()).await["status"], "succeeded");
    assert_eq!(h.status(bad.as_str()).await["status"], "failed");

    let dlq = h.queue.dead_letters().await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0]["error"], "unknown job type: unknown.x");
    assert_eq!(h.queue.backend(), "redis");
}
