//! Wires the producer, both sweepers and the worker pool over one store.

use crate::envelope::JobDefaults;
use crate::error::JobResult;
use crate::handler::HandlerRegistry;
use crate::keys::QueueKeys;
use crate::queue::JobQueue;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;
use crate::store::BackingStore;
use crate::sweeper::Sweeper;
use crate::worker::{WorkerPool, WorkerPoolConfig};
use relayq_config::AppConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The job lifecycle engine.
#[derive(Clone)]
pub struct Engine {
    queue: JobQueue,
    scheduler: Sweeper,
    retry_manager: Sweeper,
    workers: WorkerPool,
}

impl Engine {
    pub fn new(store: Arc<dyn BackingStore>, config: &AppConfig, registry: HandlerRegistry) -> Self {
        let keys = QueueKeys::from_config(&config.redis, &config.queue);
        Self {
            queue: JobQueue::new(store.clone(), keys.clone(), JobDefaults::from(&config.queue))
                .with_registry(Arc::new(registry.clone())),
            scheduler: Sweeper::scheduler(store.clone(), keys.clone(), config.sweeper.clone()),
            retry_manager: Sweeper::retry_manager(store.clone(), keys.clone(), config.sweeper.clone()),
            workers: WorkerPool::new(
                store,
                keys,
                registry,
                RetryPolicy::from(&config.queue),
                WorkerPoolConfig::from(&config.worker),
            ),
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn scheduler(&self) -> &Sweeper {
        &self.scheduler
    }

    pub fn retry_manager(&self) -> &Sweeper {
        &self.retry_manager
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Starts the scheduler, the retry manager and the workers.
    pub async fn start(&self, shutdown: ShutdownSignal) -> JobResult<EngineHandle> {
        let mut tasks = self.workers.start(shutdown.clone()).await?;
        tasks.push(self.scheduler.clone().spawn(shutdown.clone()));
        tasks.push(self.retry_manager.clone().spawn(shutdown));

        info!(tasks = tasks.len(), backend = self.queue.backend(), "Engine started");
        Ok(EngineHandle { tasks })
    }
}

/// Running engine tasks.
pub struct EngineHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every task to finish. Call after triggering shutdown.
    pub async fn join(self) {
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Engine task ended abnormally");
            }
        }
        info!("Engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::JobPayload;
    use crate::handler::EchoHandler;
    use crate::shutdown::Shutdown;
    use crate::status::JobState;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_engine_runs_job_and_stops() {
        let mut config = AppConfig::default();
        config.worker.concurrency = 2;
        config.worker.block_timeout_ms = 50;

        let mut registry = HandlerRegistry::new();
        registry.register("echo.process", EchoHandler::new(Duration::ZERO)).unwrap();

        let engine = Engine::new(Arc::new(MemoryStore::new()), &config, registry);
        let shutdown = Shutdown::new();
        let handle = engine.start(shutdown.subscribe()).await.unwrap();
        assert_eq!(handle.len(), 4);

        let id = engine
            .queue()
            .enqueue("echo.process", JobPayload::default(), None)
            .await
            .unwrap();

        let statuses = engine.queue().statuses().clone();
        let mut state = None;
        for _ in 0..100 {
            state = statuses.state(id.as_str()).await.unwrap();
            if state == Some(JobState::Succeeded) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state, Some(JobState::Succeeded));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .expect("engine did not stop");
        assert_eq!(engine.workers().stats().active_workers, 0);
    }
}
