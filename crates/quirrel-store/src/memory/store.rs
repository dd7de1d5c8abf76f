//! In-memory store implementation.
//!
//! A single mutex guards all state, which makes every [`JobStore`]
//! method exactly as atomic as its Redis counterpart. Used by tests and
//! single-process deployments.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use quirrel_core::result::AppResult;
use quirrel_core::types::{QueueDescriptor, ScanPage, TenantId};
use quirrel_entity::Job;

use crate::traits::{JobStore, PutOutcome};

/// All durable state of the in-memory provider.
#[derive(Debug, Default)]
struct Inner {
    /// Encoded queue → (job id → record).
    jobs: HashMap<String, HashMap<String, Job>>,
    /// Due-time index: (due epoch millis, member) ordered ascending.
    due: BTreeSet<(i64, String)>,
    /// In-flight members → claim epoch millis.
    inflight: HashMap<String, i64>,
    /// Encoded queue → lock expiry.
    locks: HashMap<String, Instant>,
    /// Credential → tenant.
    tokens: HashMap<String, String>,
    /// Tenant → credential.
    tenant_tokens: HashMap<String, String>,
    /// Tenant → dispatch counter.
    usage: HashMap<String, i64>,
    /// Tenant → known endpoints.
    endpoints: HashMap<String, BTreeSet<String>>,
    /// Whether the queue-directory backfill has run.
    directory_backfilled: bool,
}

/// In-memory [`JobStore`] provider.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn member_of(queue: &QueueDescriptor, id: &str) -> String {
    queue.job_member(id)
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Glob match limited to what queue patterns need: a literal prefix
/// followed by an optional trailing `*`.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => candidate == pattern,
    }
}

impl Inner {
    fn remove_due_member(&mut self, member: &str) {
        let found: Vec<(i64, String)> = self
            .due
            .iter()
            .filter(|(_, m)| m == member)
            .cloned()
            .collect();
        for entry in found {
            self.due.remove(&entry);
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn put_job(&self, job: &Job, replace: bool) -> AppResult<PutOutcome> {
        let mut inner = self.inner.lock().await;
        let queue_key = job.descriptor().encode();
        let member = member_of(&job.descriptor(), &job.id);

        let existing = inner
            .jobs
            .get(&queue_key)
            .and_then(|q| q.get(&job.id))
            .cloned();
        if let Some(existing) = existing {
            if !replace {
                return Ok(PutOutcome::Exists(existing));
            }
            inner.remove_due_member(&member);
            inner.inflight.remove(&member);
            inner
                .jobs
                .entry(queue_key)
                .or_default()
                .insert(job.id.clone(), job.clone());
            inner.due.insert((millis(job.run_at), member));
            debug!(id = %job.id, queue = %job.descriptor(), "Replaced job");
            return Ok(PutOutcome::Replaced);
        }

        inner
            .jobs
            .entry(queue_key)
            .or_default()
            .insert(job.id.clone(), job.clone());
        inner.due.insert((millis(job.run_at), member));
        Ok(PutOutcome::Created)
    }

    async fn get_job(&self, queue: &QueueDescriptor, id: &str) -> AppResult<Option<Job>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .jobs
            .get(&queue.encode())
            .and_then(|q| q.get(id))
            .cloned())
    }

    async fn delete_job(&self, queue: &QueueDescriptor, id: &str) -> AppResult<Option<Job>> {
        let mut inner = self.inner.lock().await;
        let queue_key = queue.encode();
        let member = member_of(queue, id);

        let removed = inner.jobs.get_mut(&queue_key).and_then(|q| q.remove(id));
        if removed.is_some() {
            inner.remove_due_member(&member);
            inner.inflight.remove(&member);
        }
        Ok(removed)
    }

    async fn update_run_at(
        &self,
        queue: &QueueDescriptor,
        id: &str,
        run_at: DateTime<Utc>,
    ) -> AppResult<Option<Job>> {
        let mut inner = self.inner.lock().await;
        let queue_key = queue.encode();
        let member = member_of(queue, id);

        let Some(job) = inner.jobs.get_mut(&queue_key).and_then(|q| q.get_mut(id)) else {
            return Ok(None);
        };
        job.run_at = run_at;
        let updated = job.clone();

        // A job currently in flight keeps its record updated but is not
        // re-indexed; its own outcome decides what happens next.
        if !inner.inflight.contains_key(&member) {
            inner.remove_due_member(&member);
            inner.due.insert((millis(run_at), member));
        }
        Ok(Some(updated))
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> AppResult<Vec<Job>> {
        let mut inner = self.inner.lock().await;
        let cutoff = millis(now);

        let due_members: Vec<(i64, String)> = inner
            .due
            .iter()
            .take_while(|(score, _)| *score <= cutoff)
            .take(limit)
            .cloned()
            .collect();

        let mut claimed = Vec::with_capacity(due_members.len());
        for entry in due_members {
            inner.due.remove(&entry);
            let (_, member) = entry;
            let (queue, id) = QueueDescriptor::decode_member(&member)?;
            if let Some(job) = inner.jobs.get(&queue.encode()).and_then(|q| q.get(&id)) {
                let job = job.clone();
                inner.inflight.insert(member, cutoff);
                claimed.push(job);
            }
        }
        Ok(claimed)
    }

    async fn requeue(&self, job: &Job) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let queue_key = job.descriptor().encode();
        let member = member_of(&job.descriptor(), &job.id);

        inner.inflight.remove(&member);
        inner.remove_due_member(&member);
        inner
            .jobs
            .entry(queue_key)
            .or_default()
            .insert(job.id.clone(), job.clone());
        inner.due.insert((millis(job.run_at), member));
        Ok(())
    }

    async fn ack_delete(&self, queue: &QueueDescriptor, id: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let member = member_of(queue, id);
        inner.inflight.remove(&member);
        inner.remove_due_member(&member);
        if let Some(jobs) = inner.jobs.get_mut(&queue.encode()) {
            jobs.remove(id);
        }
        Ok(())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>, lease: Duration) -> AppResult<u64> {
        let mut inner = self.inner.lock().await;
        let cutoff = millis(now) - lease.as_millis() as i64;

        let expired: Vec<String> = inner
            .inflight
            .iter()
            .filter(|(_, claimed_at)| **claimed_at <= cutoff)
            .map(|(member, _)| member.clone())
            .collect();

        for member in &expired {
            inner.inflight.remove(member);
            inner.due.insert((millis(now), member.clone()));
        }
        Ok(expired.len() as u64)
    }

    async fn scan_queue(
        &self,
        queue: &QueueDescriptor,
        cursor: u64,
        count: usize,
    ) -> AppResult<ScanPage<Job>> {
        let inner = self.inner.lock().await;
        let Some(jobs) = inner.jobs.get(&queue.encode()) else {
            return Ok(ScanPage::done(Vec::new()));
        };

        let mut ids: Vec<&String> = jobs.keys().collect();
        ids.sort();

        let offset = cursor as usize;
        let items: Vec<Job> = ids
            .iter()
            .skip(offset)
            .take(count)
            .filter_map(|id| jobs.get(*id).cloned())
            .collect();

        let next = offset + items.len();
        let cursor = if next >= ids.len() { 0 } else { next as u64 };
        Ok(ScanPage { items, cursor })
    }

    async fn scan_all(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> AppResult<ScanPage<Job>> {
        let inner = self.inner.lock().await;

        let mut queue_keys: Vec<&String> = inner
            .jobs
            .keys()
            .filter(|key| glob_match(pattern, key))
            .collect();
        queue_keys.sort();

        let offset = cursor as usize;
        let page_keys: Vec<String> = queue_keys
            .iter()
            .skip(offset)
            .take(count)
            .map(|k| (*k).clone())
            .collect();

        let mut items = Vec::new();
        for key in &page_keys {
            if let Some(jobs) = inner.jobs.get(key) {
                items.extend(jobs.values().cloned());
            }
        }

        let next = offset + page_keys.len();
        let cursor = if next >= queue_keys.len() { 0 } else { next as u64 };
        Ok(ScanPage { items, cursor })
    }

    async fn try_acquire_lock(&self, queue: &QueueDescriptor, ttl: Duration) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        let key = queue.encode();
        let now = Instant::now();

        match inner.locks.get(&key) {
            Some(expiry) if *expiry > now => Ok(false),
            _ => {
                inner.locks.insert(key, now + ttl);
                Ok(true)
            }
        }
    }

    async fn release_lock(&self, queue: &QueueDescriptor) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.locks.remove(&queue.encode());
        Ok(())
    }

    async fn put_token(&self, token: &str, tenant: &TenantId) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(old) = inner.tenant_tokens.insert(tenant.to_string(), token.to_string()) {
            inner.tokens.remove(&old);
        }
        inner.tokens.insert(token.to_string(), tenant.to_string());
        Ok(())
    }

    async fn tenant_for_token(&self, token: &str) -> AppResult<Option<TenantId>> {
        let inner = self.inner.lock().await;
        Ok(inner.tokens.get(token).map(TenantId::new))
    }

    async fn token_for_tenant(&self, tenant: &TenantId) -> AppResult<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.tenant_tokens.get(tenant.as_str()).cloned())
    }

    async fn revoke_token(&self, token: &str) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.tokens.remove(token) {
            Some(tenant) => {
                inner.tenant_tokens.remove(&tenant);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr_usage(&self, tenant: &TenantId) -> AppResult<i64> {
        let mut inner = self.inner.lock().await;
        let counter = inner.usage.entry(tenant.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn read_and_reset_usage(&self) -> AppResult<Vec<(TenantId, i64)>> {
        let mut inner = self.inner.lock().await;
        let drained: Vec<(TenantId, i64)> = inner
            .usage
            .drain()
            .map(|(tenant, count)| (TenantId::new(tenant), count))
            .collect();
        Ok(drained)
    }

    async fn add_endpoint(&self, tenant: &TenantId, endpoint: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .endpoints
            .entry(tenant.to_string())
            .or_default()
            .insert(endpoint.to_string());
        Ok(())
    }

    async fn endpoints(&self, tenant: &TenantId) -> AppResult<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .endpoints
            .get(tenant.as_str())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn pending_count(&self, queue: &QueueDescriptor) -> AppResult<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .jobs
            .get(&queue.encode())
            .map(|q| q.len() as u64)
            .unwrap_or(0))
    }

    async fn acquire_backfill_sentinel(&self) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.directory_backfilled {
            return Ok(false);
        }
        inner.directory_backfilled = true;
        Ok(true)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
