//! Application state for Axum handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use relayq_jobs::JobQueue;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
    /// Expected `x-api-key` value.
    pub api_key: Arc<str>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(queue: JobQueue, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            queue,
            api_key: api_key.into(),
            metrics: None,
        }
    }

    /// Serves the given recorder at the metrics path.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
