//! Configuration loader with layered sources.

use crate::{AppConfig, DEFAULT_API_KEY, RECLAIM_MARGIN_MS};
use config::{Config, ConfigError, Environment, File};
use relayq_core::{RelayError, RelayResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Loads `AppConfig` from a config directory and the environment.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a loader for the given directory.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `default.toml` - Default values
    /// 2. `{environment}.toml` - Environment-specific overrides
    /// 3. `local.toml` - Local overrides
    /// 4. Environment variables with `RELAYQ__` prefix
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Loader for `./config`.
    pub fn from_default_location() -> Self {
        Self::new("./config")
    }

    /// Loads and validates the configuration.
    pub fn load(&self) -> RelayResult<AppConfig> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("RELAYQ_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!(
            environment = %environment,
            config_dir = %self.config_dir.display(),
            "Loading configuration"
        );

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = self.config_dir.join(format!("{}.toml", name));
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                builder = builder.add_source(File::from(path.as_path()).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("RELAYQ")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error)?;
        let app_config: AppConfig = config.try_deserialize().map_err(config_error)?;

        validate_config(&app_config)?;

        Ok(app_config)
    }

    /// Returns the directory this loader reads from.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

/// Validates the configuration.
pub fn validate_config(config: &AppConfig) -> RelayResult<()> {
    if config.app.environment == "production" && config.security.api_key == DEFAULT_API_KEY {
        warn!("Using default API key in production! This is a security risk.");
    }

    if config.redis.url.trim().is_empty() {
        return Err(RelayError::Configuration("Redis URL is required".to_string()));
    }

    if config.redis.key_prefix.trim().is_empty() {
        return Err(RelayError::Configuration("Redis key prefix must not be empty".to_string()));
    }

    if config.queue.stream.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(RelayError::Configuration("Stream name must not be empty".to_string()));
    }

    if config
        .queue
        .consumer_group
        .as_deref()
        .is_some_and(|g| g.trim().is_empty())
    {
        return Err(RelayError::Configuration("Consumer group must not be empty".to_string()));
    }

    if config.queue.max_attempts == 0 {
        return Err(RelayError::Configuration("max_attempts must be at least 1".to_string()));
    }

    if config.worker.concurrency == 0 {
        return Err(RelayError::Configuration("Worker concurrency must be at least 1".to_string()));
    }

    if config.worker.block_timeout_ms == 0 {
        return Err(RelayError::Configuration("Worker block timeout must be at least 1ms".to_string()));
    }

    if config.queue.job_timeout_ms == 0 {
        return Err(RelayError::Configuration("job_timeout_ms must be at least 1".to_string()));
    }

    // An execution still running at reclaim time would be handed to a second worker.
    let idle_ms = config.worker.reclaim_min_idle_secs.saturating_mul(1_000);
    if config.queue.job_timeout_ms.saturating_add(RECLAIM_MARGIN_MS) > idle_ms {
        return Err(RelayError::Configuration(format!(
            "job_timeout_ms ({}) must be at least {}ms below reclaim_min_idle_secs ({}s)",
            config.queue.job_timeout_ms, RECLAIM_MARGIN_MS, config.worker.reclaim_min_idle_secs
        )));
    }

    // Each worker holds a pooled connection for the whole blocking read.
    if config.app.role.runs_engine()
        && !config.redis.is_memory()
        && config.redis.pool_size <= config.worker.concurrency.saturating_add(2)
    {
        return Err(RelayError::Configuration(format!(
            "Redis pool_size ({}) must exceed worker concurrency ({}) + 2",
            config.redis.pool_size, config.worker.concurrency
        )));
    }

    if config.sweeper.batch_size == 0 {
        return Err(RelayError::Configuration("Sweeper batch size must be at least 1".to_string()));
    }

    Ok(())
}

fn config_error(err: ConfigError) -> RelayError {
    RelayError::Configuration(err.to_string())
}
