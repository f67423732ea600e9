//! relayq Jobs - At-Least-Once Job Lifecycle Engine
//!
//! A Redis-backed job queue with:
//! - Immediate and deferred enqueue
//! - Competing workers on a consumer group
//! - Exponential backoff with jitter between attempts
//! - Dead-letter log for exhausted jobs
//! - Reclaim of entries left pending by crashed workers
//! - Per-job status records
//!
//! # Architecture
//!
//! ```text
//!   enqueue ──► scheduled set ──(scheduler)──┐
//!      │                                     ▼
//!      └────────────────────────────────► ready log ──► workers ──► succeeded
//!                                            ▲            │
//!                    retry set ◄─────────────┼────────────┤ failure
//!                        └──(retry manager)──┘            ▼
//!                                                   dead-letter log
//! ```
//!
//! Every job is delivered at least once. A crash between two store writes
//! may duplicate a delivery, so handlers must be idempotent.
//!
//! # Example
//!
//! ```rust,ignore
//! use relayq_jobs::{store, Engine, HandlerRegistry, JobPayload, Shutdown};
//!
//! let store = store::connect(&config.redis).await?;
//! let engine = Engine::new(store, &config, HandlerRegistry::with_defaults());
//! let shutdown = Shutdown::new();
//! let handle = engine.start(shutdown.subscribe()).await?;
//!
//! let id = engine
//!     .queue()
//!     .enqueue("echo.process", JobPayload::from_raw(r#"{"msg":"hi"}"#)?, None)
//!     .await?;
//!
//! shutdown.trigger();
//! handle.join().await;
//! ```

pub mod engine;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod keys;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod shutdown;
pub mod status;
pub mod store;
pub mod sweeper;
pub mod worker;

pub use engine::{Engine, EngineHandle};
pub use envelope::{now_unix, JobDefaults, JobEnvelope, JobId, JobPayload};
pub use error::{JobError, JobResult};
pub use handler::{
    EchoHandler, HandlerError, HandlerRegistry, HandlerResult, JobContext, JobHandler, ECHO_JOB_TYPE,
    UNREGISTERED_LABEL,
};
pub use keys::QueueKeys;
pub use metrics::{register_metrics, JobMetrics, WorkerMetrics};
pub use queue::JobQueue;
pub use retry::RetryPolicy;
pub use shutdown::{Shutdown, ShutdownSignal};
pub use status::{JobState, StatusStore, StatusUpdate};
pub use store::{BackingStore, LogEntry, MemoryStore, RedisStore};
pub use sweeper::{SweepKind, SweepStats, Sweeper};
pub use worker::{Outcome, WorkerPool, WorkerPoolConfig, WorkerPoolStats};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::handler::{HandlerError, HandlerResult, JobContext, JobHandler};
    pub use crate::queue::JobQueue;
    pub use crate::{JobError, JobId, JobPayload, JobResult};
}
