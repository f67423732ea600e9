//! The job envelope: the serialized unit moved between the ready log, the
//! waiting sets and the dead-letter log.

use crate::error::JobResult;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Current time as unix seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque job payload.
///
/// Held as raw JSON text so that it is embedded verbatim when the envelope
/// is serialized. Only handlers look inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPayload(Box<RawValue>);

impl JobPayload {
    /// Wraps already-valid JSON text.
    pub fn from_raw(json: impl Into<String>) -> JobResult<Self> {
        Ok(Self(RawValue::from_string(json.into())?))
    }

    /// Serializes a value into a payload.
    pub fn from_value<T: Serialize>(value: &T) -> JobResult<Self> {
        Ok(Self(serde_json::value::to_raw_value(value)?))
    }

    /// Decodes the payload into a handler-specific type.
    pub fn parse<T: DeserializeOwned>(&self) -> JobResult<T> {
        Ok(serde_json::from_str(self.0.get())?)
    }

    /// The raw JSON text.
    pub fn as_str(&self) -> &str {
        self.0.get()
    }
}

impl Default for JobPayload {
    fn default() -> Self {
        Self(RawValue::NULL.to_owned())
    }
}

impl PartialEq for JobPayload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Values stamped onto every new envelope.
#[derive(Debug, Clone, Copy)]
pub struct JobDefaults {
    pub max_attempts: u32,
    pub timeout_ms: u64,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            timeout_ms: 30_000,
        }
    }
}

impl From<&relayq_config::QueueConfig> for JobDefaults {
    fn from(config: &relayq_config::QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            timeout_ms: config.job_timeout_ms,
        }
    }
}

/// A job as it travels through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub payload: JobPayload,
    /// Failed executions so far.
    #[serde(default)]
    pub attempt: u32,
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<i64>,
}

impl JobEnvelope {
    /// Builds a fresh envelope with a new id and `attempt = 0`.
    pub fn new(
        job_type: impl Into<String>,
        payload: JobPayload,
        scheduled_at: Option<i64>,
        defaults: JobDefaults,
        now: i64,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            attempt: 0,
            max_attempts: defaults.max_attempts,
            timeout_ms: defaults.timeout_ms,
            created_at: now,
            scheduled_at,
        }
    }

    /// True when the release time lies strictly after `now`.
    pub fn is_deferred(&self, now: i64) -> bool {
        self.scheduled_at.is_some_and(|at| at > now)
    }

    /// Counts a failed execution. Returns true while another attempt is
    /// allowed.
    pub fn record_failure(&mut self) -> bool {
        self.attempt = self.attempt.saturating_add(1);
        self.can_retry()
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn to_json(&self) -> JobResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> JobResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
