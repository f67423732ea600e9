//! Job handlers and the type-keyed registry the worker dispatches through.

use crate::envelope::{JobEnvelope, JobId, JobPayload};
use crate::error::{JobError, JobResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Type tag of the bundled echo handler.
pub const ECHO_JOB_TYPE: &str = "echo.process";

/// Metric label shared by every job type without a handler.
pub const UNREGISTERED_LABEL: &str = "unregistered";

/// Descriptive handler failure. The message becomes the job's `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn unknown_type(job_type: &str) -> Self {
        Self::new(format!("unknown job type: {}", job_type))
    }

    pub fn timed_out(timeout_ms: u64) -> Self {
        Self::new(format!("job timed out after {}ms", timeout_ms))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<JobError> for HandlerError {
    fn from(err: JobError) -> Self {
        Self::new(err.to_string())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// What a handler knows about the job besides its payload.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub job_type: String,
    /// Failed executions before this one.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl JobContext {
    /// True if failing now sends the job to the dead-letter log.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt.saturating_add(1) >= self.max_attempts
    }
}

impl From<&JobEnvelope> for JobContext {
    fn from(job: &JobEnvelope) -> Self {
        Self {
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
            attempt: job.attempt,
            max_attempts: job.max_attempts,
        }
    }
}

/// Execution logic for one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, ctx: &JobContext, payload: &JobPayload) -> HandlerResult;
}

/// Simulated task: logs the payload and sleeps for a fixed duration.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    duration: Duration,
}

impl EchoHandler {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl JobHandler for EchoHandler {
    async fn execute(&self, ctx: &JobContext, payload: &JobPayload) -> HandlerResult {
        info!(job_id = %ctx.job_id, payload = payload.as_str(), "echo");
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

/// Maps job types to handlers. Registration is additive; a type can be
/// registered once.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.handlers.insert(ECHO_JOB_TYPE.to_string(), Arc::new(EchoHandler::default()));
        registry
    }

    /// Registers a handler for `job_type`.
    pub fn register(&mut self, job_type: impl Into<String>, handler: impl JobHandler + 'static) -> JobResult<()> {
        let job_type = job_type.into();
        if self.handlers.contains_key(&job_type) {
            return Err(JobError::Handler(format!(
                "handler already registered for job type '{}'",
                job_type
            )));
        }
        self.handlers.insert(job_type, Arc::new(handler));
        Ok(())
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Label value for per-type metrics. Types without a handler share one
    /// series so callers cannot grow the label set.
    pub fn metric_label<'a>(&self, job_type: &'a str) -> &'a str {
        if self.is_registered(job_type) {
            job_type
        } else {
            UNREGISTERED_LABEL
        }
    }

    /// Registered types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Runs the handler for `ctx.job_type`. An unregistered type fails
    /// immediately.
    pub async fn dispatch(&self, ctx: &JobContext, payload: &JobPayload) -> HandlerResult {
        match self.get(&ctx.job_type) {
            Some(handler) => handler.execute(ctx, payload).await,
            None => Err(HandlerError::unknown_type(&ctx.job_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl JobHandler for AlwaysFails {
        async fn execute(&self, _ctx: &JobContext, _payload: &JobPayload) -> HandlerResult {
            Err(HandlerError::new("boom"))
        }
    }

    fn ctx(job_type: &str) -> JobContext {
        JobContext {
            job_id: JobId::new(),
            job_type: job_type.to_string(),
            attempt: 0,
            max_attempts: 5,
        }
    }

    #[test]
    fn test_defaults_include_echo() {
        let registry = HandlerRegistry::with_defaults();
        assert!(registry.is_registered(ECHO_JOB_TYPE));
        assert_eq!(registry.registered_types(), vec![ECHO_JOB_TYPE.to_string()]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register("x", AlwaysFails).unwrap();
        let err = registry.register("x", AlwaysFails).unwrap_err();
        assert!(matches!(err, JobError::Handler(_)));
    }

    #[tokio::test]
    async fn test_unknown_type_fails() {
        let registry = HandlerRegistry::with_defaults();
        let err = registry
            .dispatch(&ctx("unknown.x"), &JobPayload::default())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "unknown job type: unknown.x");
    }

    #[tokio::test]
    async fn test_dispatch_to_registered_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register("fails", AlwaysFails).unwrap();
        registry.register("echo", EchoHandler::new(Duration::ZERO)).unwrap();

        assert!(registry.dispatch(&ctx("echo"), &JobPayload::default()).await.is_ok());
        let err = registry.dispatch(&ctx("fails"), &JobPayload::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_last_attempt() {
        let mut c = ctx("x");
        c.attempt = 3;
        assert!(!c.is_last_attempt());
        c.attempt = 4;
        assert!(c.is_last_attempt());
        c.attempt = u32::MAX;
        assert!(c.is_last_attempt());
    }

    #[test]
    fn test_metric_label_folds_unknown_types() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.metric_label(ECHO_JOB_TYPE), ECHO_JOB_TYPE);
        assert_eq!(registry.metric_label("made.up.1"), UNREGISTERED_LABEL);
        assert_eq!(registry.metric_label("made.up.2"), UNREGISTERED_LABEL);
    }

    #[test]
    fn test_timed_out_message() {
        assert_eq!(HandlerError::timed_out(250).to_string(), "job timed out after 250ms");
    }
}
