//! Externally visible job status records.
//!
//! Every lifecycle transition merge-upserts the job's hash record. Fields are
//! only ever added or overwritten, never removed, and no record expires.

use crate::envelope::now_unix;
use crate::error::JobResult;
use crate::keys::QueueKeys;
use crate::store::BackingStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the scheduled set for its release time.
    Scheduled,
    /// In the ready log.
    Queued,
    /// Claimed by a worker.
    Processing,
    /// Handler finished successfully.
    Succeeded,
    /// Waiting in the retry set.
    Retrying,
    /// Attempts exhausted; dead-lettered.
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Scheduled => "scheduled",
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Retrying => "retrying",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(JobState::Scheduled),
            "queued" => Ok(JobState::Queued),
            "processing" => Ok(JobState::Processing),
            "succeeded" => Ok(JobState::Succeeded),
            "retrying" => Ok(JobState::Retrying),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// One status write: the new state plus extra fields to merge.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    state: JobState,
    fields: Vec<(String, String)>,
}

impl StatusUpdate {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            fields: Vec::new(),
        }
    }

    /// Adds a field to merge alongside the state.
    pub fn field(mut self, name: &str, value: impl ToString) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn into_fields(self, now: i64) -> Vec<(String, String)> {
        let mut fields = Vec::with_capacity(self.fields.len() + 2);
        fields.push(("status".to_string(), self.state.to_string()));
        fields.push(("updated_at".to_string(), now.to_string()));
        fields.extend(self.fields);
        fields
    }
}

/// Reads and writes per-job status records.
#[derive(Clone)]
pub struct StatusStore {
    store: Arc<dyn BackingStore>,
    keys: QueueKeys,
}

impl StatusStore {
    pub fn new(store: Arc<dyn BackingStore>, keys: QueueKeys) -> Self {
        Self { store, keys }
    }

    /// Merges `update` into the job's record, stamping `status` and
    /// `updated_at`.
    pub async fn set(&self, job_id: &str, update: StatusUpdate) -> JobResult<()> {
        let fields = update.into_fields(now_unix());
        self.store.hash_merge(&self.keys.job(job_id), &fields).await
    }

    /// Like `set`, but a failed write is logged and swallowed. Routing never
    /// depends on the status record.
    pub async fn record(&self, job_id: &str, update: StatusUpdate) {
        let state = update.state();
        if let Err(e) = self.set(job_id, update).await {
            warn!(job_id, status = %state, error = %e, "Failed to write job status");
        }
    }

    /// The full record, or `None` if the job has never been written.
    pub async fn get(&self, job_id: &str) -> JobResult<Option<HashMap<String, String>>> {
        let record = self.store.hash_read_all(&self.keys.job(job_id)).await?;
        Ok((!record.is_empty()).then_some(record))
    }

    /// Just the state, if the record exists and carries a known one.
    pub async fn state(&self, job_id: &str) -> JobResult<Option<JobState>> {
        Ok(self
            .get(job_id)
            .await?
            .and_then(|r| r.get("status").and_then(|s| s.parse().ok())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn status_store() -> StatusStore {
        StatusStore::new(Arc::new(MemoryStore::new()), QueueKeys::default())
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [
            JobState::Scheduled,
            JobState::Queued,
            JobState::Processing,
            JobState::Succeeded,
            JobState::Retrying,
            JobState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<JobState>(), Ok(state));
        }
        assert!("done".parse::<JobState>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Retrying.is_terminal());
    }

    #[tokio::test]
    async fn test_set_merges_fields() {
        let statuses = status_store();
        statuses
            .set("j1", StatusUpdate::new(JobState::Queued).field("created_at", 100))
            .await
            .unwrap();
        statuses
            .set("j1", StatusUpdate::new(JobState::Processing).field("attempts", 0))
            .await
            .unwrap();

        let record = statuses.get("j1").await.unwrap().unwrap();
        assert_eq!(record["status"], "processing");
        assert_eq!(record["created_at"], "100");
        assert_eq!(record["attempts"], "0");
        assert!(record.contains_key("updated_at"));
        assert_eq!(statuses.state("j1").await.unwrap(), Some(JobState::Processing));
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let statuses = status_store();
        assert!(statuses.get("nope").await.unwrap().is_none());
        assert!(statuses.state("nope").await.unwrap().is_none());
    }
}
