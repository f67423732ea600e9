//! Worker pool: competing consumers on the ready log.
//!
//! Each worker blocks on a bounded group read, runs the handler for the
//! job's type under the job's timeout and routes the outcome: success is
//! recorded and acknowledged, a failure goes to the retry set or, once
//! attempts are exhausted, to the dead-letter log. An entry is acknowledged
//! only after its routing write succeeded; anything left pending is picked
//! up again by the periodic reclaim pass.
//!
//! No execution outlives `max_job_timeout`, which sits below the reclaim idle
//! time, so the reclaim pass never takes an entry whose worker is still
//! running it.

use crate::envelope::{now_unix, JobEnvelope};
use crate::error::{JobError, JobResult};
use crate::handler::{HandlerError, HandlerRegistry, JobContext};
use crate::keys::QueueKeys;
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;
use crate::status::{JobState, StatusStore, StatusUpdate};
use crate::store::{BackingStore, LogEntry};
use relayq_config::WorkerConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub concurrency: usize,

    /// Consumer name prefix.
    pub consumer_name: String,

    /// Upper bound of one blocking read.
    pub block_timeout: Duration,

    /// Time between reclaim passes of one worker.
    pub reclaim_interval: Duration,

    /// Idle time after which a pending entry may be reclaimed.
    pub reclaim_min_idle: Duration,

    /// Entries claimed per pass.
    pub reclaim_batch_size: usize,

    /// Ceiling on any single execution, whatever the envelope asks for.
    pub max_job_timeout: Duration,

    /// Sleep after a failed read.
    pub error_backoff: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerPoolConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            consumer_name: config.consumer_name.clone(),
            block_timeout: config.block_timeout(),
            reclaim_interval: config.reclaim_interval(),
            reclaim_min_idle: config.reclaim_min_idle(),
            reclaim_batch_size: config.reclaim_batch_size,
            max_job_timeout: config.max_job_timeout(),
            error_backoff: config.error_backoff(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicU64,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    reclaimed: AtomicU64,
    malformed: AtomicU64,
}

/// Worker pool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolStats {
    /// Pool ID.
    pub id: String,

    /// Configured concurrency.
    pub concurrency: usize,

    /// Worker tasks currently running.
    pub active_workers: u64,

    /// Entries handled, including malformed ones.
    pub jobs_processed: u64,

    pub jobs_succeeded: u64,

    /// Handler failures (each one is retried or dead-lettered).
    pub jobs_failed: u64,

    pub jobs_retried: u64,

    pub jobs_dead_lettered: u64,

    pub jobs_reclaimed: u64,

    pub malformed: u64,
}

/// What happened to one ready-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// Scheduled for another attempt at the given unix time.
    Retrying { attempt: u32, release_at: i64 },
    DeadLettered { attempt: u32 },
    /// Undecodable entry copied to the dead-letter log.
    Malformed,
    /// The routing write failed; the entry stays pending.
    Unrouted,
}

/// Pool of workers sharing one consumer group.
#[derive(Clone)]
pub struct WorkerPool {
    id: String,
    store: Arc<dyn BackingStore>,
    keys: QueueKeys,
    statuses: StatusStore,
    registry: Arc<HandlerRegistry>,
    retry: RetryPolicy,
    config: WorkerPoolConfig,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(
        store: Arc<dyn BackingStore>,
        keys: QueueKeys,
        registry: HandlerRegistry,
        retry: RetryPolicy,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            id: format!("worker-pool-{}", Uuid::new_v4()),
            statuses: StatusStore::new(store.clone(), keys.clone()),
            store,
            keys,
            registry: Arc::new(registry),
            retry,
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Creates the consumer group if needed.
    pub async fn ensure_group(&self) -> JobResult<()> {
        self.store.ensure_group(self.keys.stream(), self.keys.group()).await
    }

    /// Ensures the group and spawns `concurrency` workers.
    pub async fn start(&self, shutdown: ShutdownSignal) -> JobResult<Vec<JoinHandle<()>>> {
        if self.config.concurrency == 0 {
            return Err(JobError::Configuration("worker concurrency must be at least 1".to_string()));
        }

        self.ensure_group().await?;

        info!(
            pool_id = %self.id,
            concurrency = self.config.concurrency,
            stream = self.keys.stream(),
            group = self.keys.group(),
            handlers = ?self.registry.registered_types(),
            "Starting worker pool"
        );

        let handles = (0..self.config.concurrency)
            .map(|index| {
                let consumer = format!("{}-{}", self.config.consumer_name, index);
                let span = tracing::info_span!("worker", pool_id = %self.id, consumer = %consumer);
                tokio::spawn(self.clone().run_worker(consumer, shutdown.clone()).instrument(span))
            })
            .collect();

        Ok(handles)
    }

    async fn run_worker(self, consumer: String, mut shutdown: ShutdownSignal) {
        let active = self.counters.active.fetch_add(1, Ordering::Relaxed) + 1;
        WorkerMetrics::update_active(active);
        info!("Worker started");

        // Reclaim first so entries left behind by a previous process are
        // not stuck until the first interval elapses.
        let mut next_reclaim = Instant::now();

        while !shutdown.is_triggered() {
            if Instant::now() >= next_reclaim {
                if let Err(e) = self.reclaim_once(&consumer).await {
                    warn!(error = %e, "Reclaim pass failed");
                }
                next_reclaim = Instant::now() + self.config.reclaim_interval;
            }

            let read = tokio::select! {
                _ = shutdown.wait() => break,
                read = self.store.read_group(
                    self.keys.stream(),
                    self.keys.group(),
                    &consumer,
                    self.config.block_timeout,
                    1,
                ) => read,
            };

            match read {
                // A read that returns at once must not starve the runtime.
                Ok(entries) if entries.is_empty() => tokio::task::yield_now().await,
                Ok(entries) => {
                    for entry in entries {
                        self.process_entry(entry).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to read from ready log");
                    if !shutdown.sleep(self.config.error_backoff).await {
                        break;
                    }
                }
            }
        }

        let active = self.counters.active.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        WorkerMetrics::update_active(active);
        info!("Worker stopped");
    }

    /// Reads one batch as `consumer` and processes it. Returns the number of
    /// entries handled.
    pub async fn poll_once(&self, consumer: &str) -> JobResult<usize> {
        let entries = self
            .store
            .read_group(
                self.keys.stream(),
                self.keys.group(),
                consumer,
                self.config.block_timeout,
                1,
            )
            .await?;
        let count = entries.len();
        for entry in entries {
            self.process_entry(entry).await;
        }
        Ok(count)
    }

    /// Claims entries idle for at least `reclaim_min_idle` and processes
    /// them as if newly delivered.
    pub async fn reclaim_once(&self, consumer: &str) -> JobResult<usize> {
        let entries = self
            .store
            .claim_stale(
                self.keys.stream(),
                self.keys.group(),
                consumer,
                self.config.reclaim_min_idle,
                self.config.reclaim_batch_size,
            )
            .await?;

        let count = entries.len();
        if count > 0 {
            info!(count, "Reclaimed stale pending entries");
            self.counters.reclaimed.fetch_add(count as u64, Ordering::Relaxed);
            JobMetrics::job_reclaimed(count);
        }
        for entry in entries {
            self.process_entry(entry).await;
        }
        Ok(count)
    }

    /// Runs one delivered entry to completion and acknowledges it once its
    /// outcome is durable.
    pub async fn process_entry(&self, entry: LogEntry) -> Outcome {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        let decoded = match entry.field("job") {
            Some(raw) => JobEnvelope::from_json(raw).map_err(|e| format!("malformed envelope: {}", e)),
            None => Err("entry has no job field".to_string()),
        };

        let outcome = match decoded {
            Ok(job) => self.execute(job).await,
            Err(reason) => self.dead_letter_malformed(&entry, &reason).await,
        };

        if outcome == Outcome::Unrouted {
            warn!(entry_id = %entry.id, "Leaving entry pending for reclaim");
        } else if let Err(e) = self.store.ack(self.keys.stream(), self.keys.group(), &entry.id).await {
            warn!(entry_id = %entry.id, error = %e, "Failed to acknowledge entry");
        }

        outcome
    }

    async fn execute(&self, mut job: JobEnvelope) -> Outcome {
        let started_at = now_unix();
        self.statuses
            .record(
                job.id.as_str(),
                StatusUpdate::new(JobState::Processing)
                    .field("started_at", started_at)
                    .field("attempts", job.attempt),
            )
            .await;
        let label = self.registry.metric_label(&job.job_type);
        JobMetrics::job_started(label);
        debug!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempt, "Processing job");

        let ctx = JobContext::from(&job);
        let limit = self.execution_limit(&job);
        let clock = Instant::now();
        let result = timeout(limit, self.registry.dispatch(&ctx, &job.payload))
            .await
            .unwrap_or_else(|_| {
                let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                Err(HandlerError::timed_out(limit_ms))
            });
        let elapsed = clock.elapsed();

        match result {
            Ok(()) => {
                self.statuses
                    .record(
                        job.id.as_str(),
                        StatusUpdate::new(JobState::Succeeded)
                            .field("finished_at", now_unix())
                            .field("attempts", job.attempt),
                    )
                    .await;
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                JobMetrics::job_succeeded(label, elapsed);
                info!(job_id = %job.id, job_type = %job.job_type, elapsed_ms = elapsed.as_millis() as u64, "Job succeeded");
                Outcome::Succeeded
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                JobMetrics::job_failed(label, elapsed);
                warn!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempt, error = %err, "Job failed");
                match self.route_failure(&mut job, &err).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "Failed to route failed job");
                        Outcome::Unrouted
                    }
                }
            }
        }
    }

    /// The envelope's timeout capped at `max_job_timeout`; an envelope
    /// without one gets the cap.
    fn execution_limit(&self, job: &JobEnvelope) -> Duration {
        let cap = self.config.max_job_timeout;
        if job.timeout_ms == 0 {
            cap
        } else {
            job.timeout().min(cap)
        }
    }

    async fn route_failure(&self, job: &mut JobEnvelope, err: &HandlerError) -> JobResult<Outcome> {
        let now = now_unix();
        let last_error = err.to_string();

        if job.record_failure() {
            let release_at = self.retry.release_at(now, job.attempt);
            self.store
                .set_add(&self.keys.retry(), release_at, &job.to_json()?)
                .await?;
            self.statuses
                .record(
                    job.id.as_str(),
                    StatusUpdate::new(JobState::Retrying)
                        .field("last_error", &last_error)
                        .field("attempts", job.attempt),
                )
                .await;
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            JobMetrics::job_retried(self.registry.metric_label(&job.job_type));
            info!(job_id = %job.id, attempt = job.attempt, release_at, "Job scheduled for retry");
            Ok(Outcome::Retrying {
                attempt: job.attempt,
                release_at,
            })
        } else {
            let raw = job.to_json()?;
            let failed_at = now.to_string();
            self.store
                .append(
                    &self.keys.dlq(),
                    &[("job", raw.as_str()), ("error", last_error.as_str()), ("failed_at", failed_at.as_str())],
                )
                .await?;
            self.statuses
                .record(
                    job.id.as_str(),
                    StatusUpdate::new(JobState::Failed)
                        .field("last_error", &last_error)
                        .field("finished_at", now)
                        .field("attempts", job.attempt),
                )
                .await;
            self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
            JobMetrics::job_dead_lettered(self.registry.metric_label(&job.job_type));
            warn!(job_id = %job.id, attempt = job.attempt, "Job reached max attempts, moved to dead-letter log");
            Ok(Outcome::DeadLettered { attempt: job.attempt })
        }
    }

    async fn dead_letter_malformed(&self, entry: &LogEntry, reason: &str) -> Outcome {
        warn!(entry_id = %entry.id, reason, "Dead-lettering malformed entry");
        self.counters.malformed.fetch_add(1, Ordering::Relaxed);
        JobMetrics::job_malformed("ready");

        let failed_at = now_unix().to_string();
        let mut fields: Vec<(&str, &str)> = entry
            .fields
            .iter()
            .filter(|(k, _)| k.as_str() != "error" && k.as_str() != "failed_at")
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        fields.push(("error", reason));
        fields.push(("failed_at", failed_at.as_str()));

        match self.store.append(&self.keys.dlq(), &fields).await {
            Ok(_) => Outcome::Malformed,
            Err(e) => {
                error!(entry_id = %entry.id, error = %e, "Failed to dead-letter malformed entry");
                Outcome::Unrouted
            }
        }
    }

    /// Get the pool ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        let c = &self.counters;
        WorkerPoolStats {
            id: self.id.clone(),
            concurrency: self.config.concurrency,
            active_workers: c.active.load(Ordering::Relaxed),
            jobs_processed: c.processed.load(Ordering::Relaxed),
            jobs_succeeded: c.succeeded.load(Ordering::Relaxed),
            jobs_failed: c.failed.load(Ordering::Relaxed),
            jobs_retried: c.retried.load(Ordering::Relaxed),
            jobs_dead_lettered: c.dead_lettered.load(Ordering::Relaxed),
            jobs_reclaimed: c.reclaimed.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
        }
    }
}
