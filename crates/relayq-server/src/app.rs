//! Application assembly and run loop.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use relayq_config::AppConfig;
use relayq_core::{RelayError, RelayResult};
use relayq_jobs::{register_metrics, store, Engine, HandlerRegistry, Shutdown};
use relayq_rest::{create_router, AppState};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// A configured relayq process.
pub struct App {
    config: AppConfig,
    engine: Engine,
    metrics: Option<PrometheusHandle>,
}

impl App {
    /// Connects the store and wires the engine with the bundled handlers.
    ///
    /// A store that cannot be reached here is fatal.
    pub async fn build(config: AppConfig) -> RelayResult<Self> {
        Self::build_with_handlers(config, HandlerRegistry::with_defaults()).await
    }

    pub async fn build_with_handlers(config: AppConfig, registry: HandlerRegistry) -> RelayResult<Self> {
        let metrics = if config.observability.metrics_enabled {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| RelayError::Configuration(format!("failed to install metrics recorder: {}", e)))?;
            register_metrics();
            Some(handle)
        } else {
            None
        };

        let store = store::connect(&config.redis).await?;
        info!(backend = store.backend(), url = %config.redis.redacted_url(), "Connected to backing store");

        let engine = Engine::new(store, &config, registry);
        Ok(Self {
            config,
            engine,
            metrics,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Runs the API and/or the engine loops until `signal` resolves, then
    /// drains in-flight work.
    pub async fn run<F>(self, signal: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let role = self.config.app.role;
        crate::startup::print_startup_info(&self.config, self.engine.queue().backend());

        let shutdown = Arc::new(Shutdown::new());
        let trigger = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                signal.await;
                shutdown.trigger();
            })
        };

        let engine = if role.runs_engine() {
            Some(self.engine.start(shutdown.subscribe()).await?)
        } else {
            None
        };

        let served = if role.runs_api() {
            self.serve(shutdown.subscribe()).await
        } else {
            shutdown.subscribe().wait().await;
            Ok(())
        };

        shutdown.trigger();
        trigger.abort();

        if let Some(handle) = engine {
            info!("Waiting for engine tasks to finish");
            handle.join().await;
        }

        match &served {
            Ok(()) => info!("Server shutdown complete"),
            Err(e) => error!(error = %e, "Server stopped with error"),
        }
        served
    }

    async fn serve(&self, mut stop: relayq_jobs::ShutdownSignal) -> RelayResult<()> {
        let mut state = AppState::new(self.engine.queue().clone(), self.config.security.api_key.as_str());
        if let Some(handle) = &self.metrics {
            state = state.with_metrics(handle.clone());
        }
        let router = create_router(state, &self.config.server, &self.config.observability.metrics_path);

        let addr = self.config.server.addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        info!("Starting REST server on http://{}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop.wait().await })
            .await
            .map_err(|e| RelayError::Internal(format!("REST server error: {}", e)))
    }
}
