//! Store key layout.

use relayq_config::{QueueConfig, RedisConfig};

/// Key builder for one queue namespace.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    prefix: String,
    stream: String,
    group: String,
}

impl QueueKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            stream: format!("{}:stream", prefix),
            group: format!("{}:cg", prefix),
            prefix,
        }
    }

    /// Applies the optional log and group overrides.
    pub fn from_config(redis: &RedisConfig, queue: &QueueConfig) -> Self {
        let mut keys = Self::new(redis.key_prefix.clone());
        if let Some(stream) = &queue.stream {
            keys.stream.clone_from(stream);
        }
        if let Some(group) = &queue.consumer_group {
            keys.group.clone_from(group);
        }
        keys
    }

    /// Status hash for a job.
    pub fn job(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    /// Deferred jobs, scored by release time.
    pub fn scheduled(&self) -> String {
        format!("{}:scheduled", self.prefix)
    }

    /// Jobs waiting for their next attempt, scored by release time.
    pub fn retry(&self) -> String {
        format!("{}:retry", self.prefix)
    }

    /// Dead-letter log.
    pub fn dlq(&self) -> String {
        format!("{}:dlq", self.prefix)
    }

    /// Ready log.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Consumer group on the ready log.
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for QueueKeys {
    fn default() -> Self {
        Self::new("jobs")
    }
}
