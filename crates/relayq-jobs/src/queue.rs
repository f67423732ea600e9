//! Producer-side operations: enqueue, status lookup and dead-letter listing.

use crate::envelope::{now_unix, JobDefaults, JobEnvelope, JobId, JobPayload};
use crate::error::{JobError, JobResult};
use crate::handler::{HandlerRegistry, UNREGISTERED_LABEL};
use crate::keys::QueueKeys;
use crate::metrics::JobMetrics;
use crate::status::{JobState, StatusStore, StatusUpdate};
use crate::store::BackingStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Entry point for producers.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn BackingStore>,
    keys: QueueKeys,
    statuses: StatusStore,
    defaults: JobDefaults,
    registry: Option<Arc<HandlerRegistry>>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn BackingStore>, keys: QueueKeys, defaults: JobDefaults) -> Self {
        Self {
            statuses: StatusStore::new(store.clone(), keys.clone()),
            store,
            keys,
            defaults,
            registry: None,
        }
    }

    /// Uses `registry` to label enqueue metrics. Without one every job is
    /// counted as unregistered.
    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    fn metric_label<'a>(&self, job_type: &'a str) -> &'a str {
        self.registry
            .as_ref()
            .map_or(UNREGISTERED_LABEL, |registry| registry.metric_label(job_type))
    }

    /// Enqueues a job, deferring it when `scheduled_at` is in the future.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: JobPayload,
        scheduled_at: Option<i64>,
    ) -> JobResult<JobId> {
        self.enqueue_at(job_type, payload, scheduled_at, now_unix()).await
    }

    /// `enqueue` with an explicit clock.
    ///
    /// The initial status record is written before the routing write so a
    /// fast worker's `processing` update cannot be overwritten by it. If the
    /// routing write fails the record is marked `failed` with the store
    /// error, the error is returned and no id is handed out.
    pub async fn enqueue_at(
        &self,
        job_type: &str,
        payload: JobPayload,
        scheduled_at: Option<i64>,
        now: i64,
    ) -> JobResult<JobId> {
        let job_type = job_type.trim();
        if job_type.is_empty() {
            return Err(JobError::Validation("job type is required".to_string()));
        }

        let job = JobEnvelope::new(job_type, payload, scheduled_at, self.defaults, now);
        let raw = job.to_json()?;
        let deferred = job.is_deferred(now);

        let mut initial = StatusUpdate::new(if deferred { JobState::Scheduled } else { JobState::Queued })
            .field("created_at", now)
            .field("type", &job.job_type)
            .field("attempts", job.attempt);
        if let (true, Some(at)) = (deferred, job.scheduled_at) {
            initial = initial.field("scheduled_at", at);
        }
        self.statuses.record(job.id.as_str(), initial).await;

        let (routed, route) = match (deferred, job.scheduled_at) {
            (true, Some(at)) => (self.store.set_add(&self.keys.scheduled(), at, &raw).await, "scheduled"),
            _ => (
                self.store
                    .append(self.keys.stream(), &[("job", raw.as_str())])
                    .await
                    .map(|_| ()),
                "ready",
            ),
        };

        if let Err(e) = routed {
            error!(job_id = %job.id, job_type = %job.job_type, route, error = %e, "Failed to route new job");
            self.statuses
                .record(
                    job.id.as_str(),
                    StatusUpdate::new(JobState::Failed)
                        .field("last_error", format!("enqueue failed: {}", e))
                        .field("finished_at", now),
                )
                .await;
            return Err(e);
        }

        JobMetrics::job_enqueued(self.metric_label(&job.job_type), route);
        info!(job_id = %job.id, job_type = %job.job_type, route, scheduled_at = ?job.scheduled_at, "Job enqueued");
        Ok(job.id)
    }

    /// The job's status record, or `None` for an unknown id.
    pub async fn status(&self, job_id: &str) -> JobResult<Option<HashMap<String, String>>> {
        self.statuses.get(job_id).await
    }

    /// Every dead-letter entry's fields, oldest first.
    pub async fn dead_letters(&self) -> JobResult<Vec<HashMap<String, String>>> {
        let entries = self.store.range_all(&self.keys.dlq()).await?;
        debug!(count = entries.len(), "Listed dead-letter entries");
        Ok(entries.into_iter().map(|e| e.fields).collect())
    }

    /// Checks that the store answers.
    pub async fn ping(&self) -> JobResult<()> {
        self.store.ping().await
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    pub fn statuses(&self) -> &StatusStore {
        &self.statuses
    }
}
