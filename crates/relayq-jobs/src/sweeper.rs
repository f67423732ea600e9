//! Waiting-set sweeps: the scheduler (scheduled set) and the retry manager
//! (retry set).
//!
//! Both loops read matured members in score order, append each to the ready
//! log and only then remove it from the set, so an interruption between the
//! two steps can duplicate a job but never lose one. The `queued` status is
//! written before the append; once the entry is in the log a worker owns the
//! record.

use crate::envelope::{now_unix, JobEnvelope};
use crate::error::JobResult;
use crate::keys::QueueKeys;
use crate::metrics::JobMetrics;
use crate::shutdown::ShutdownSignal;
use crate::status::{JobState, StatusStore, StatusUpdate};
use crate::store::BackingStore;
use relayq_config::SweeperConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Which waiting set a sweeper drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    /// Deferred jobs whose release time has come.
    Scheduled,
    /// Failed jobs whose backoff has elapsed.
    Retry,
}

impl SweepKind {
    pub fn name(self) -> &'static str {
        match self {
            SweepKind::Scheduled => "scheduler",
            SweepKind::Retry => "retry-manager",
        }
    }

    fn source(self) -> &'static str {
        match self {
            SweepKind::Scheduled => "scheduled",
            SweepKind::Retry => "retry",
        }
    }

    fn set_key(self, keys: &QueueKeys) -> String {
        match self {
            SweepKind::Scheduled => keys.scheduled(),
            SweepKind::Retry => keys.retry(),
        }
    }
}

/// Sweep counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub polls: u64,
    pub released: u64,
    pub malformed: u64,
    pub errors: u64,
    /// Released entries that could not be removed from their set.
    pub remove_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    polls: AtomicU64,
    released: AtomicU64,
    malformed: AtomicU64,
    errors: AtomicU64,
    remove_failures: AtomicU64,
}

/// Result of one poll.
#[derive(Debug, Default)]
struct Pass {
    released: usize,
    /// Entries left in the set after a failed remove.
    stuck: usize,
}

/// Moves matured entries of one waiting set into the ready log.
#[derive(Clone)]
pub struct Sweeper {
    kind: SweepKind,
    store: Arc<dyn BackingStore>,
    keys: QueueKeys,
    statuses: StatusStore,
    config: SweeperConfig,
    counters: Arc<Counters>,
}

impl Sweeper {
    pub fn new(kind: SweepKind, store: Arc<dyn BackingStore>, keys: QueueKeys, config: SweeperConfig) -> Self {
        Self {
            kind,
            statuses: StatusStore::new(store.clone(), keys.clone()),
            store,
            keys,
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Releases deferred jobs.
    pub fn scheduler(store: Arc<dyn BackingStore>, keys: QueueKeys, config: SweeperConfig) -> Self {
        Self::new(SweepKind::Scheduled, store, keys, config)
    }

    /// Releases jobs whose retry backoff has elapsed.
    pub fn retry_manager(store: Arc<dyn BackingStore>, keys: QueueKeys, config: SweeperConfig) -> Self {
        Self::new(SweepKind::Retry, store, keys, config)
    }

    pub fn kind(&self) -> SweepKind {
        self.kind
    }

    /// One poll: releases up to a batch of members scored `<= now`.
    ///
    /// Returns how many were released. A failed range read or append ends
    /// the poll with an error; the unreleased entries stay in the set.
    pub async fn sweep_once(&self, now: i64) -> JobResult<usize> {
        Ok(self.sweep(now).await?.released)
    }

    async fn sweep(&self, now: i64) -> JobResult<Pass> {
        self.counters.polls.fetch_add(1, Ordering::Relaxed);

        let set = self.kind.set_key(&self.keys);
        let due = self
            .store
            .set_range_by_score(&set, now, self.config.batch_size)
            .await?;

        let mut pass = Pass::default();
        for raw in due {
            let job = match JobEnvelope::from_json(&raw) {
                Ok(job) => job,
                Err(e) => {
                    warn!(sweeper = self.kind.name(), error = %e, "Dropping malformed entry");
                    self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                    JobMetrics::job_malformed(self.kind.source());
                    if let Err(e) = self.store.set_remove(&set, &raw).await {
                        warn!(sweeper = self.kind.name(), error = %e, "Failed to remove malformed entry");
                        pass.stuck += 1;
                        self.counters.remove_failures.fetch_add(1, Ordering::Relaxed);
                    }
                    continue;
                }
            };

            let write_queued = match self.kind {
                SweepKind::Scheduled => true,
                SweepKind::Retry => job.can_retry(),
            };
            if write_queued {
                self.statuses
                    .record(
                        job.id.as_str(),
                        StatusUpdate::new(JobState::Queued).field("released_at", now),
                    )
                    .await;
            }

            self.store
                .append(self.keys.stream(), &[("job", raw.as_str())])
                .await?;

            if let Err(e) = self.store.set_remove(&set, &raw).await {
                // Left in the set, the entry will be released a second time.
                warn!(job_id = %job.id, sweeper = self.kind.name(), error = %e, "Failed to remove released entry");
                pass.stuck += 1;
                self.counters.remove_failures.fetch_add(1, Ordering::Relaxed);
            }

            pass.released += 1;
            self.counters.released.fetch_add(1, Ordering::Relaxed);
            JobMetrics::job_released(self.kind.source());
            debug!(
                job_id = %job.id,
                job_type = %job.job_type,
                attempt = job.attempt,
                sweeper = self.kind.name(),
                "Released job to ready log"
            );
        }

        Ok(pass)
    }

    /// Polls until shutdown. A full batch is followed by an immediate
    /// re-poll; otherwise the loop sleeps for the poll interval. A poll that
    /// failed, or left released entries behind in the set, is followed by
    /// the error backoff.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!(
            sweeper = self.kind.name(),
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "Starting sweeper"
        );

        while !shutdown.is_triggered() {
            let pause = match self.sweep(now_unix()).await {
                Ok(pass) if pass.stuck > 0 => {
                    warn!(sweeper = self.kind.name(), stuck = pass.stuck, "Entries left in set, backing off");
                    self.config.error_backoff()
                }
                Ok(pass) if pass.released >= self.config.batch_size => Duration::ZERO,
                Ok(_) => self.config.poll_interval(),
                Err(e) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(sweeper = self.kind.name(), error = %e, "Sweep failed, backing off");
                    self.config.error_backoff()
                }
            };

            if pause.is_zero() {
                tokio::task::yield_now().await;
            } else if !shutdown.sleep(pause).await {
                break;
            }
        }

        info!(sweeper = self.kind.name(), "Sweeper stopped");
    }

    /// Spawns `run` on the runtime.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let span = tracing::info_span!("sweeper", kind = self.kind.name());
        tokio::spawn(self.run(shutdown).instrument(span))
    }

    pub fn stats(&self) -> SweepStats {
        SweepStats {
            polls: self.counters.polls.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            remove_failures: self.counters.remove_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{JobDefaults, JobPayload};
    use crate::shutdown::Shutdown;
    use crate::store::MemoryStore;

    fn job(attempt: u32, max_attempts: u32) -> JobEnvelope {
        let mut job = JobEnvelope::new("echo.process", JobPayload::default(), None, JobDefaults::default(), 0);
        job.attempt = attempt;
        job.max_attempts = max_attempts;
        job
    }

    fn setup(kind: SweepKind) -> (Arc<MemoryStore>, Sweeper) {
        let store = Arc::new(MemoryStore::new());
        let sweeper = Sweeper::new(kind, store.clone(), QueueKeys::default(), SweeperConfig::default());
        (store, sweeper)
    }

    #[tokio::test]
    async fn test_releases_only_matured_entries() {
        let (store, sweeper) = setup(SweepKind::Scheduled);
        let due = job(0, 5);
        let later = job(0, 5);
        store.set_add("jobs:scheduled", 100, &due.to_json().unwrap()).await.unwrap();
        store.set_add("jobs:scheduled", 200, &later.to_json().unwrap()).await.unwrap();

        assert_eq!(sweeper.sweep_once(150).await.unwrap(), 1);
        assert_eq!(store.log_len("jobs:stream"), 1);
        assert_eq!(store.set_len("jobs:scheduled"), 1);

        let record = store.hash_read_all(&format!("jobs:job:{}", due.id)).await.unwrap();
        assert_eq!(record["status"], "queued");
        assert_eq!(record["released_at"], "150");
    }

    #[tokio::test]
    async fn test_batch_limit() {
        let (store, sweeper) = setup(SweepKind::Scheduled);
        for i in 0..15 {
            store.set_add("jobs:scheduled", i, &job(0, 5).to_json().unwrap()).await.unwrap();
        }
        assert_eq!(sweeper.sweep_once(100).await.unwrap(), 10);
        assert_eq!(sweeper.sweep_once(100).await.unwrap(), 5);
        assert_eq!(store.log_len("jobs:stream"), 15);
    }

    #[tokio::test]
    async fn test_empty_sweep_is_noop() {
        let (store, sweeper) = setup(SweepKind::Retry);
        assert_eq!(sweeper.sweep_once(1_000).await.unwrap(), 0);
        assert_eq!(sweeper.sweep_once(1_000).await.unwrap(), 0);
        assert_eq!(store.log_len("jobs:stream"), 0);
        assert_eq!(sweeper.stats().polls, 2);
    }

    #[tokio::test]
    async fn test_malformed_entry_removed() {
        let (store, sweeper) = setup(SweepKind::Scheduled);
        store.set_add("jobs:scheduled", 1, "{garbage").await.unwrap();
        assert_eq!(sweeper.sweep_once(10).await.unwrap(), 0);
        assert_eq!(store.set_len("jobs:scheduled"), 0);
        assert_eq!(store.log_len("jobs:stream"), 0);
        assert_eq!(sweeper.stats().malformed, 1);
    }

    #[tokio::test]
    async fn test_retry_manager_writes_queued_below_ceiling() {
        let (store, sweeper) = setup(SweepKind::Retry);
        let retry = job(2, 5);
        store.set_add("jobs:retry", 1, &retry.to_json().unwrap()).await.unwrap();

        assert_eq!(sweeper.sweep_once(10).await.unwrap(), 1);
        let record = store.hash_read_all(&format!("jobs:job:{}", retry.id)).await.unwrap();
        assert_eq!(record["status"], "queued");
    }

    #[tokio::test]
    async fn test_retry_manager_skips_status_at_ceiling() {
        let (store, sweeper) = setup(SweepKind::Retry);
        let exhausted = job(5, 5);
        store.set_add("jobs:retry", 1, &exhausted.to_json().unwrap()).await.unwrap();

        assert_eq!(sweeper.sweep_once(10).await.unwrap(), 1);
        assert_eq!(store.log_len("jobs:stream"), 1);
        assert!(store
            .hash_read_all(&format!("jobs:job:{}", exhausted.id))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_released_entry_is_verbatim() {
        let (store, sweeper) = setup(SweepKind::Scheduled);
        let raw = job(0, 5).to_json().unwrap();
        store.set_add("jobs:scheduled", 1, &raw).await.unwrap();
        sweeper.sweep_once(1).await.unwrap();

        let entries = store.range_all("jobs:stream").await.unwrap();
        assert_eq!(entries[0].field("job"), Some(raw.as_str()));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_, sweeper) = setup(SweepKind::Scheduled);
        let shutdown = Shutdown::new();
        let handle = sweeper.clone().spawn(shutdown.subscribe());

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
        assert!(sweeper.stats().polls >= 1);
    }
}
