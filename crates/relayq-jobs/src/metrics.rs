//! Prometheus metrics for the job lifecycle.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! binary installs a recorder. `job_type` labels are expected to come from
//! `HandlerRegistry::metric_label`, which keeps the label set bounded.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job queue.
pub mod names {
    /// Jobs accepted by enqueue.
    pub const JOBS_ENQUEUED_TOTAL: &str = "relayq_jobs_enqueued_total";
    /// Jobs moved from a waiting set into the ready log.
    pub const JOBS_RELEASED_TOTAL: &str = "relayq_jobs_released_total";
    /// Executions started.
    pub const JOBS_STARTED_TOTAL: &str = "relayq_jobs_started_total";
    /// Executions that succeeded.
    pub const JOBS_SUCCEEDED_TOTAL: &str = "relayq_jobs_succeeded_total";
    /// Failed executions scheduled for another attempt.
    pub const JOBS_RETRIED_TOTAL: &str = "relayq_jobs_retried_total";
    /// Jobs moved to the dead-letter log.
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "relayq_jobs_dead_lettered_total";
    /// Pending entries taken over by the reclaim pass.
    pub const JOBS_RECLAIMED_TOTAL: &str = "relayq_jobs_reclaimed_total";
    /// Undecodable envelopes dropped or dead-lettered.
    pub const JOBS_MALFORMED_TOTAL: &str = "relayq_jobs_malformed_total";
    /// Handler execution time.
    pub const JOB_DURATION_SECONDS: &str = "relayq_job_duration_seconds";
    /// Worker tasks currently running.
    pub const WORKERS_ACTIVE: &str = "relayq_workers_active";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_RELEASED_TOTAL,
        "Total number of jobs released from the scheduled or retry set"
    );
    describe_counter!(names::JOBS_STARTED_TOTAL, "Total number of job executions started");
    describe_counter!(names::JOBS_SUCCEEDED_TOTAL, "Total number of jobs completed successfully");
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries scheduled");
    describe_counter!(
        names::JOBS_DEAD_LETTERED_TOTAL,
        "Total number of jobs sent to the dead-letter log"
    );
    describe_counter!(
        names::JOBS_RECLAIMED_TOTAL,
        "Total number of stale pending entries reclaimed"
    );
    describe_counter!(names::JOBS_MALFORMED_TOTAL, "Total number of malformed envelopes");
    describe_histogram!(names::JOB_DURATION_SECONDS, "Job handler duration in seconds");
    describe_gauge!(names::WORKERS_ACTIVE, "Number of running worker tasks");
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// `route` is `ready` or `scheduled`.
    pub fn job_enqueued(job_type: &str, route: &'static str) {
        counter!(
            names::JOBS_ENQUEUED_TOTAL,
            "job_type" => job_type.to_string(),
            "route" => route
        )
        .increment(1);
    }

    /// `source` is `scheduled` or `retry`.
    pub fn job_released(source: &'static str) {
        counter!(names::JOBS_RELEASED_TOTAL, "source" => source).increment(1);
    }

    pub fn job_started(job_type: &str) {
        counter!(names::JOBS_STARTED_TOTAL, "job_type" => job_type.to_string()).increment(1);
    }

    pub fn job_succeeded(job_type: &str, duration: Duration) {
        counter!(names::JOBS_SUCCEEDED_TOTAL, "job_type" => job_type.to_string()).increment(1);
        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "outcome" => "succeeded"
        )
        .record(duration.as_secs_f64());
    }

    pub fn job_failed(job_type: &str, duration: Duration) {
        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "outcome" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    pub fn job_retried(job_type: &str) {
        counter!(names::JOBS_RETRIED_TOTAL, "job_type" => job_type.to_string()).increment(1);
    }

    pub fn job_dead_lettered(job_type: &str) {
        counter!(names::JOBS_DEAD_LETTERED_TOTAL, "job_type" => job_type.to_string()).increment(1);
    }

    pub fn job_reclaimed(count: usize) {
        counter!(names::JOBS_RECLAIMED_TOTAL).increment(count as u64);
    }

    /// `source` names the structure the bad entry came from.
    pub fn job_malformed(source: &'static str) {
        counter!(names::JOBS_MALFORMED_TOTAL, "source" => source).increment(1);
    }
}

/// Worker metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    pub fn update_active(active: u64) {
        gauge!(names::WORKERS_ACTIVE).set(active as f64);
    }
}
