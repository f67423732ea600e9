//! In-process store with the same observable semantics as the Redis adapter:
//! consumer groups deliver each entry once, unacknowledged entries stay
//! pending until acked or claimed, and sets order by (score, member).

use super::{BackingStore, LogEntry};
use crate::error::{JobError, JobResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct Pending {
    consumer: String,
    delivered_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct Group {
    /// Index of the next never-delivered entry.
    next: usize,
    pending: HashMap<String, Pending>,
}

#[derive(Debug, Default)]
struct Log {
    entries: Vec<LogEntry>,
    groups: HashMap<String, Group>,
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

#[derive(Debug, Default)]
struct Inner {
    logs: HashMap<String, Log>,
    sets: HashMap<String, SortedSet>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// Memory-backed `BackingStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    appended: Notify,
    seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a log.
    pub fn log_len(&self, log: &str) -> usize {
        self.inner.lock().logs.get(log).map_or(0, |l| l.entries.len())
    }

    /// Number of delivered but unacknowledged entries of a group.
    pub fn pending_count(&self, log: &str, group: &str) -> usize {
        self.inner
            .lock()
            .logs
            .get(log)
            .and_then(|l| l.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Number of members in a set.
    pub fn set_len(&self, set: &str) -> usize {
        self.inner.lock().sets.get(set).map_or(0, |s| s.ordered.len())
    }

    /// Score of a set member.
    pub fn set_score(&self, set: &str, member: &str) -> Option<i64> {
        self.inner.lock().sets.get(set)?.scores.get(member).copied()
    }

    /// Current owner and delivery count of a pending entry.
    pub fn pending_entry(&self, log: &str, group: &str, id: &str) -> Option<(String, u32)> {
        let inner = self.inner.lock();
        let pending = inner.logs.get(log)?.groups.get(group)?.pending.get(id)?;
        Some((pending.consumer.clone(), pending.deliveries))
    }

    fn next_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", chrono::Utc::now().timestamp_millis(), seq)
    }

    fn try_read(&self, log: &str, group: &str, consumer: &str, count: usize) -> JobResult<Vec<LogEntry>> {
        let mut inner = self.inner.lock();
        let log_state = inner
            .logs
            .get_mut(log)
            .ok_or_else(|| no_group(log, group))?;
        let Log { entries, groups } = log_state;
        let group_state = groups.get_mut(group).ok_or_else(|| no_group(log, group))?;

        let start = group_state.next;
        let end = entries.len().min(start.saturating_add(count.max(1)));
        let delivered: Vec<LogEntry> = entries[start..end].to_vec();
        group_state.next = end;

        let now = Instant::now();
        for entry in &delivered {
            group_state.pending.insert(
                entry.id.clone(),
                Pending {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    deliveries: 1,
                },
            );
        }

        Ok(delivered)
    }
}

fn no_group(log: &str, group: &str) -> JobError {
    JobError::Internal(format!("NOGROUP no consumer group '{}' for log '{}'", group, log))
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn ensure_group(&self, log: &str, group: &str) -> JobResult<()> {
        let mut inner = self.inner.lock();
        let log_state = inner.logs.entry(log.to_string()).or_default();
        log_state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn append(&self, log: &str, fields: &[(&str, &str)]) -> JobResult<String> {
        let id = self.next_id();
        {
            let mut inner = self.inner.lock();
            inner.logs.entry(log.to_string()).or_default().entries.push(LogEntry {
                id: id.clone(),
                fields: fields
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            });
        }
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn read_group(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> JobResult<Vec<LogEntry>> {
        let deadline = Instant::now() + block;
        loop {
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let entries = self.try_read(log, group, consumer, count)?;
            if !entries.is_empty() {
                return Ok(entries);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, log: &str, group: &str, id: &str) -> JobResult<()> {
        let mut inner = self.inner.lock();
        if let Some(group_state) = inner.logs.get_mut(log).and_then(|l| l.groups.get_mut(group)) {
            group_state.pending.remove(id);
        }
        Ok(())
    }

    async fn claim_stale(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> JobResult<Vec<LogEntry>> {
        let mut inner = self.inner.lock();
        let log_state = inner
            .logs
            .get_mut(log)
            .ok_or_else(|| no_group(log, group))?;
        let Log { entries, groups } = log_state;
        let group_state = groups.get_mut(group).ok_or_else(|| no_group(log, group))?;

        let now = Instant::now();
        let mut claimed = Vec::new();
        for entry in entries.iter() {
            if claimed.len() >= count {
                break;
            }
            if let Some(pending) = group_state.pending.get_mut(&entry.id) {
                if now.saturating_duration_since(pending.delivered_at) >= min_idle {
                    pending.consumer = consumer.to_string();
                    pending.delivered_at = now;
                    pending.deliveries += 1;
                    claimed.push(entry.clone());
                }
            }
        }

        Ok(claimed)
    }

    async fn range_all(&self, log: &str) -> JobResult<Vec<LogEntry>> {
        Ok(self
            .inner
            .lock()
            .logs
            .get(log)
            .map(|l| l.entries.clone())
            .unwrap_or_default())
    }

    async fn set_add(&self, set: &str, score: i64, member: &str) -> JobResult<()> {
        let mut inner = self.inner.lock();
        let sorted = inner.sets.entry(set.to_string()).or_default();
        if let Some(old) = sorted.scores.insert(member.to_string(), score) {
            sorted.ordered.remove(&(old, member.to_string()));
        }
        sorted.ordered.insert((score, member.to_string()));
        Ok(())
    }

    async fn set_range_by_score(&self, set: &str, max: i64, limit: usize) -> JobResult<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .sets
            .get(set)
            .map(|s| {
                s.ordered
                    .iter()
                    .take_while(|(score, _)| *score <= max)
                    .take(limit)
                    .map(|(_, member)| member.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_remove(&self, set: &str, member: &str) -> JobResult<bool> {
        let mut inner = self.inner.lock();
        let Some(sorted) = inner.sets.get_mut(set) else {
            return Ok(false);
        };
        match sorted.scores.remove(member) {
            Some(score) => {
                sorted.ordered.remove(&(score, member.to_string()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hash_merge(&self, key: &str, fields: &[(String, String)]) -> JobResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .extend(fields.iter().cloned());
        Ok(())
    }

    async fn hash_read_all(&self, key: &str) -> JobResult<HashMap<String, String>> {
        Ok(self.inner.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> JobResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
