//! Application configuration structures.

use relayq_core::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Gap kept between the longest job execution and the reclaim idle time, so
/// the reclaim pass only ever takes entries whose worker is gone.
pub const RECLAIM_MARGIN_MS: u64 = 5_000;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Backing store connection.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Job defaults and log names.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Scheduler sweep and retry manager configuration.
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// API credential.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Which parts of the system a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// HTTP API plus worker pool and sweeps.
    #[default]
    All,
    /// HTTP API only.
    Api,
    /// Worker pool and sweeps only.
    Worker,
}

impl Role {
    #[must_use]
    pub const fn runs_api(self) -> bool {
        matches!(self, Self::All | Self::Api)
    }

    #[must_use]
    pub const fn runs_engine(self) -> bool {
        matches!(self, Self::All | Self::Worker)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Api => write!(f, "api"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
    /// Process role.
    pub role: Role,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "relayq".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            role: Role::default(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ServerConfig {
    /// Returns the listen address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Backing store configuration.
///
/// `url` accepts `redis://` and `rediss://` URLs, or `memory://` for a
/// process-local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Store URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Namespace prepended to every key.
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool_size: 16,
            connect_timeout_secs: 5,
            key_prefix: "jobs".to_string(),
        }
    }
}

impl RedisConfig {
    /// Returns true for the in-process store.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory://")
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The URL with any password masked, for logs.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<invalid url>".to_string(),
        }
    }
}

/// Job defaults and log names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Ready log name. Defaults to `<prefix>:stream`.
    pub stream: Option<String>,
    /// Consumer group name. Defaults to `<prefix>:cg`.
    pub consumer_group: Option<String>,
    /// Attempt ceiling stamped on new jobs.
    pub max_attempts: u32,
    /// Execution budget stamped on new jobs.
    pub job_timeout_ms: u64,
    /// Base of the exponential retry backoff.
    pub retry_base_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stream: None,
            consumer_group: None,
            max_attempts: 5,
            job_timeout_ms: 30_000,
            retry_base_ms: 1_000,
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub const fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent worker tasks.
    pub concurrency: usize,
    /// Consumer name prefix; each task appends its index.
    pub consumer_name: String,
    /// Upper bound of a single blocking read.
    pub block_timeout_ms: u64,
    /// How often each worker runs a reclaim pass.
    pub reclaim_interval_secs: u64,
    /// Minimum idle time before a pending entry may be reclaimed.
    pub reclaim_min_idle_secs: u64,
    /// Entries claimed per reclaim pass.
    pub reclaim_batch_size: usize,
    /// Sleep after a failed read.
    pub error_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            consumer_name: "worker".to_string(),
            block_timeout_ms: 5_000,
            reclaim_interval_secs: 30,
            reclaim_min_idle_secs: 60,
            reclaim_batch_size: 10,
            error_backoff_ms: 1_000,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub const fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    #[must_use]
    pub const fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    #[must_use]
    pub const fn reclaim_min_idle(&self) -> Duration {
        Duration::from_secs(self.reclaim_min_idle_secs)
    }

    /// Longest a single execution may run before the reclaim pass could
    /// hand its entry to another worker.
    #[must_use]
    pub const fn max_job_timeout(&self) -> Duration {
        Duration::from_millis(self.reclaim_min_idle_secs.saturating_mul(1_000).saturating_sub(RECLAIM_MARGIN_MS))
    }

    #[must_use]
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Configuration shared by the scheduler sweep and the retry manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Sleep between polls.
    pub poll_interval_ms: u64,
    /// Entries released per poll.
    pub batch_size: usize,
    /// Sleep after a failed range read.
    pub error_backoff_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 10,
            error_backoff_ms: 1_000,
        }
    }
}

impl SweeperConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Security configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Value expected in the `x-api-key` header.
    pub api_key: String,
}

/// Placeholder credential shipped in the defaults.
pub const DEFAULT_API_KEY: &str = "devkey";

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` string).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: LogFormat,
    /// Install the Prometheus recorder and serve it.
    pub metrics_enabled: bool,
    /// Metrics endpoint path.
    pub metrics_path: String,
    /// OTLP collector endpoint.
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info,relayq=debug,tower_http=debug".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
            otlp_endpoint: None,
        }
    }
}

impl ObservabilityConfig {
    /// Builds the telemetry settings for `init_telemetry`.
    #[must_use]
    pub fn telemetry(&self, service_name: &str) -> TelemetryConfig {
        TelemetryConfig {
            log_level: Some(self.log_level.clone()),
            log_format: self.log_format,
            service_name: service_name.to_string(),
            otlp_endpoint: self.otlp_endpoint.clone(),
            ..TelemetryConfig::default()
        }
    }
}
