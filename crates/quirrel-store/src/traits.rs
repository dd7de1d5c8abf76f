//! The backing store interface.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use quirrel_core::result::AppResult;
use quirrel_core::types::{QueueDescriptor, ScanPage, TenantId};
use quirrel_entity::Job;

/// Outcome of a `put_job` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The job was stored; no prior record existed.
    Created,
    /// A prior record with the same id was replaced.
    Replaced,
    /// A record already existed and `replace` was false; nothing was
    /// written. Carries the stored record unchanged.
    Exists(Job),
}

/// Durable state operations for the scheduling engine.
///
/// Every method is a single atomic operation against the store: multiple
/// producer and worker instances run concurrently against the same data,
/// so no method may require a caller-side read-modify-write. The
/// claim/requeue/ack triple is the safety-critical core — a job is
/// always in exactly one of the due index, the in-flight set, or gone.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug {
    // ── Job records ─────────────────────────────────────────────

    /// Write a job record and its due-index entry atomically.
    ///
    /// With `replace = false` an existing `(id, queue)` wins and is
    /// returned untouched ([`PutOutcome::Exists`]); with `replace = true`
    /// the prior record (pending or in-flight) is superseded.
    async fn put_job(&self, job: &Job, replace: bool) -> AppResult<PutOutcome>;

    /// Fetch one job record.
    async fn get_job(&self, queue: &QueueDescriptor, id: &str) -> AppResult<Option<Job>>;

    /// Remove a job and all its index entries; returns the removed
    /// record so callers can distinguish not-found precisely.
    ///
    /// A job already claimed finishes its current dispatch attempt; the
    /// delete prevents any future requeue.
    async fn delete_job(&self, queue: &QueueDescriptor, id: &str) -> AppResult<Option<Job>>;

    /// Move a job's due time without touching its schedule bookkeeping
    /// (manual immediate execution). A job currently in flight keeps
    /// its record updated but is not re-indexed.
    async fn update_run_at(
        &self,
        queue: &QueueDescriptor,
        id: &str,
        run_at: DateTime<Utc>,
    ) -> AppResult<Option<Job>>;

    // ── Claim cycle ─────────────────────────────────────────────

    /// Atomically move up to `limit` jobs whose due time is at or
    /// before `now` from the due index to the in-flight set and return
    /// them.
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> AppResult<Vec<Job>>;

    /// Return an in-flight job to the due index at `job.run_at`,
    /// persisting the record (count, retry cursor, new due time).
    async fn requeue(&self, job: &Job) -> AppResult<()>;

    /// Remove a finished in-flight job entirely.
    async fn ack_delete(&self, queue: &QueueDescriptor, id: &str) -> AppResult<()>;

    /// Return jobs claimed longer than `lease` ago to the due index for
    /// immediate re-delivery; returns how many were reclaimed.
    async fn reclaim_expired(&self, now: DateTime<Utc>, lease: Duration) -> AppResult<u64>;

    // ── Scans ───────────────────────────────────────────────────

    /// Cursor-paged scan over one queue's stored jobs.
    async fn scan_queue(
        &self,
        queue: &QueueDescriptor,
        cursor: u64,
        count: usize,
    ) -> AppResult<ScanPage<Job>>;

    /// Cursor-paged scan over every queue whose encoded descriptor
    /// matches `pattern` (glob, e.g. `"*"` or `"<enc-tenant>/*"`).
    async fn scan_all(&self, pattern: &str, cursor: u64, count: usize)
        -> AppResult<ScanPage<Job>>;

    // ── Exclusivity locks ───────────────────────────────────────

    /// Try to take the per-queue exclusivity lock; `false` when held.
    async fn try_acquire_lock(&self, queue: &QueueDescriptor, ttl: Duration) -> AppResult<bool>;

    /// Release the per-queue exclusivity lock.
    async fn release_lock(&self, queue: &QueueDescriptor) -> AppResult<()>;

    // ── Tokens ──────────────────────────────────────────────────

    /// Map a bearer credential to a tenant (and back).
    async fn put_token(&self, token: &str, tenant: &TenantId) -> AppResult<()>;

    /// Resolve a credential to its tenant.
    async fn tenant_for_token(&self, token: &str) -> AppResult<Option<TenantId>>;

    /// The credential of a tenant, used as default HMAC signing secret.
    async fn token_for_tenant(&self, tenant: &TenantId) -> AppResult<Option<String>>;

    /// Revoke a credential; `true` if it existed.
    async fn revoke_token(&self, token: &str) -> AppResult<bool>;

    // ── Usage metering ──────────────────────────────────────────

    /// Increment the tenant's dispatch counter.
    async fn incr_usage(&self, tenant: &TenantId) -> AppResult<i64>;

    /// Drain all usage counters (consumed by the admin usage surface).
    async fn read_and_reset_usage(&self) -> AppResult<Vec<(TenantId, i64)>>;

    // ── Queue directory ─────────────────────────────────────────

    /// Record that a tenant has used an endpoint (idempotent).
    async fn add_endpoint(&self, tenant: &TenantId, endpoint: &str) -> AppResult<()>;

    /// Endpoints a tenant has ever enqueued to.
    async fn endpoints(&self, tenant: &TenantId) -> AppResult<Vec<String>>;

    /// Number of stored (pending or in-flight) jobs on a queue.
    async fn pending_count(&self, queue: &QueueDescriptor) -> AppResult<u64>;

    /// One-shot directory backfill guard; only the first caller ever
    /// receives `true`.
    async fn acquire_backfill_sentinel(&self) -> AppResult<bool>;

    // ── Health ──────────────────────────────────────────────────

    /// Whether the store is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
