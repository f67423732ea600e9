//! Server startup utilities.

use relayq_config::AppConfig;
use tracing::info;

/// Logs where the process listens and which loops it runs.
pub fn print_startup_info(config: &AppConfig, backend: &str) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("Role:      {}", config.app.role);
    info!("Store:     {} ({})", backend, config.redis.key_prefix);
    if config.app.role.runs_api() {
        info!("REST API:  http://{}", config.server.addr());
        info!("Health:    http://{}/health", config.server.addr());
        if config.observability.metrics_enabled {
            info!("Metrics:   http://{}{}", config.server.addr(), config.observability.metrics_path);
        }
    }
    if config.app.role.runs_engine() {
        info!("Workers:   {}", config.worker.concurrency);
    }
    info!("{}", separator);
}
