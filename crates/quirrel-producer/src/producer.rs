//! The producer: enqueue, scan, find, delete, invoke.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use quirrel_core::config::producer::ProducerConfig;
use quirrel_core::error::AppError;
use quirrel_core::events::{ActivityEvent, ActivityKind};
use quirrel_core::result::AppResult;
use quirrel_core::traits::TelemetryReporter;
use quirrel_core::types::{QueueDescriptor, ScanPage, TenantId};
use quirrel_entity::{EnqueueRequest, Job, JobDto};
use quirrel_realtime::ActivityPublisher;
use quirrel_scheduler::compute_initial_run_at;
use quirrel_store::{JobStore, PutOutcome};

use crate::validation;

/// Creates, queries, cancels, and force-invokes jobs.
///
/// All operations are scoped by the tenant resolved from the caller's
/// credential by the auth layer. When a legacy store is attached
/// (migration mode), reads fan out to both instances and idempotent
/// enqueues respect jobs still owned by the old one.
#[derive(Debug, Clone)]
pub struct Producer {
    /// The current backing store.
    store: Arc<dyn JobStore>,
    /// Legacy instance during a migration window.
    legacy: Option<Arc<dyn JobStore>>,
    /// Activity fan-out.
    activity: Arc<ActivityPublisher>,
    /// Optional telemetry seam.
    reporter: Option<Arc<dyn TelemetryReporter>>,
    /// Producer limits.
    config: ProducerConfig,
}

impl Producer {
    /// Create a producer against one store.
    pub fn new(
        store: Arc<dyn JobStore>,
        activity: Arc<ActivityPublisher>,
        config: ProducerConfig,
    ) -> Self {
        Self {
            store,
            legacy: None,
            activity,
            reporter: None,
            config,
        }
    }

    /// Attach a legacy store for the migration window.
    pub fn with_legacy(mut self, legacy: Arc<dyn JobStore>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    /// Attach a telemetry reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn TelemetryReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    // ── Enqueue ─────────────────────────────────────────────────

    /// Create a job, idempotently.
    ///
    /// With an existing `(id, queue)` and `override = false` the stored
    /// record is returned unchanged and nothing is written. With
    /// `override = true` the prior record is replaced and, in migration
    /// mode, the legacy copy is removed after the create succeeds.
    pub async fn enqueue(
        &self,
        tenant: &TenantId,
        endpoint: &str,
        request: EnqueueRequest,
    ) -> AppResult<Job> {
        validation::validate_endpoint(endpoint)?;
        let schedule = validation::validate_request(&request)?;

        let now = Utc::now();
        let run_at = compute_initial_run_at(now, request.run_at, request.delay, schedule.as_ref())
            .map_err(|e| AppError::validation(e.to_string()))?;

        let queue = QueueDescriptor::new(tenant.clone(), endpoint);

        // A job still owned by the legacy instance must never be
        // duplicated: an idempotent enqueue with an explicit id returns
        // the legacy record untouched.
        if !request.override_existing {
            if let (Some(legacy), Some(id)) = (&self.legacy, &request.id) {
                if let Some(existing) = legacy.get_job(&queue, id).await? {
                    debug!(id = %id, queue = %queue, "Enqueue resolved by legacy instance");
                    return Ok(existing);
                }
            }
        }

        let job = Job {
            id: request
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            tenant: tenant.clone(),
            endpoint: endpoint.to_string(),
            payload: request.body.clone(),
            run_at,
            exclusive: request.exclusive,
            retry: request.retry.clone(),
            retry_cursor: 0,
            count: 1,
            schedule,
        };

        match self.store.put_job(&job, request.override_existing).await? {
            PutOutcome::Exists(existing) => {
                debug!(id = %job.id, queue = %queue, "Enqueue was an idempotent no-op");
                Ok(existing)
            }
            outcome => {
                if request.override_existing {
                    if let Some(legacy) = &self.legacy {
                        if legacy.delete_job(&queue, &job.id).await?.is_some() {
                            debug!(id = %job.id, queue = %queue, "Removed legacy copy after override");
                        }
                    }
                }

                self.store.add_endpoint(tenant, endpoint).await?;
                self.activity
                    .publish(
                        tenant,
                        ActivityEvent::new(
                            ActivityKind::Scheduled,
                            serde_json::to_value(JobDto::from_job(&job))?,
                        ),
                    )
                    .await;
                if let Some(reporter) = &self.reporter {
                    reporter.job_enqueued(tenant);
                }

                debug!(
                    id = %job.id,
                    queue = %queue,
                    run_at = %job.run_at,
                    outcome = ?outcome,
                    "Enqueued job"
                );
                Ok(job)
            }
        }
    }

    /// Enqueue a batch of jobs against one endpoint.
    ///
    /// The batch is validated up front and rejected whole on any bad
    /// item; per-item idempotency is then applied independently.
    pub async fn enqueue_many(
        &self,
        tenant: &TenantId,
        endpoint: &str,
        requests: Vec<EnqueueRequest>,
    ) -> AppResult<Vec<Job>> {
        if requests.len() > self.config.max_batch_size {
            return Err(AppError::validation(format!(
                "Batch of {} exceeds the maximum of {}",
                requests.len(),
                self.config.max_batch_size
            )));
        }

        validation::validate_endpoint(endpoint)?;
        for request in &requests {
            validation::validate_request(request)?;
        }

        let mut jobs = Vec::with_capacity(requests.len());
        for request in requests {
            jobs.push(self.enqueue(tenant, endpoint, request).await?);
        }
        Ok(jobs)
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Cursor-paged scan over a queue's stored jobs.
    pub async fn scan(
        &self,
        tenant: &TenantId,
        endpoint: &str,
        cursor: u64,
        count: Option<usize>,
    ) -> AppResult<ScanPage<Job>> {
        let queue = QueueDescriptor::new(tenant.clone(), endpoint);
        self.store
            .scan_queue(&queue, cursor, count.unwrap_or(self.config.scan_count))
            .await
    }

    /// Cursor-paged scan across all of a tenant's queues.
    pub async fn scan_tenant(
        &self,
        tenant: &TenantId,
        cursor: u64,
        count: Option<usize>,
    ) -> AppResult<ScanPage<Job>> {
        let pattern = format!(
            "{}/*",
            QueueDescriptor::new(tenant.clone(), "").encode().trim_end_matches('/')
        );
        self.store
            .scan_all(&pattern, cursor, count.unwrap_or(self.config.scan_count))
            .await
    }

    /// Cursor-paged scan across every queue matching an encoded
    /// descriptor pattern, for admin tooling.
    pub async fn scan_all(
        &self,
        pattern: &str,
        cursor: u64,
        count: Option<usize>,
    ) -> AppResult<ScanPage<Job>> {
        self.store
            .scan_all(pattern, cursor, count.unwrap_or(self.config.scan_count))
            .await
    }

    /// Fetch one job; in migration mode the legacy instance answers
    /// when the current one has no record.
    pub async fn find_by_id(
        &self,
        tenant: &TenantId,
        endpoint: &str,
        id: &str,
    ) -> AppResult<Option<Job>> {
        let queue = QueueDescriptor::new(tenant.clone(), endpoint);
        if let Some(job) = self.store.get_job(&queue, id).await? {
            return Ok(Some(job));
        }
        match &self.legacy {
            Some(legacy) => legacy.get_job(&queue, id).await,
            None => Ok(None),
        }
    }

    // ── Mutations ───────────────────────────────────────────────

    /// Cancel a job; returns the removed record, or `None` so callers
    /// can 404 precisely.
    pub async fn delete(
        &self,
        tenant: &TenantId,
        endpoint: &str,
        id: &str,
    ) -> AppResult<Option<Job>> {
        let queue = QueueDescriptor::new(tenant.clone(), endpoint);

        let mut removed = self.store.delete_job(&queue, id).await?;
        if removed.is_none() {
            if let Some(legacy) = &self.legacy {
                removed = legacy.delete_job(&queue, id).await?;
            }
        }

        if let Some(job) = &removed {
            self.activity
                .publish(
                    tenant,
                    ActivityEvent::new(
                        ActivityKind::Deleted,
                        serde_json::to_value(JobDto::from_job(job))?,
                    ),
                )
                .await;
            info!(id = %id, queue = %queue, "Deleted job");
        }
        Ok(removed)
    }

    /// Bring a job's due time to now for manual immediate execution,
    /// leaving its schedule and counters untouched.
    pub async fn invoke(
        &self,
        tenant: &TenantId,
        endpoint: &str,
        id: &str,
    ) -> AppResult<Option<Job>> {
        let queue = QueueDescriptor::new(tenant.clone(), endpoint);
        let now = Utc::now();

        let mut updated = self.store.update_run_at(&queue, id, now).await?;
        if updated.is_none() {
            if let Some(legacy) = &self.legacy {
                updated = legacy.update_run_at(&queue, id, now).await?;
            }
        }

        if let Some(job) = &updated {
            self.activity
                .publish(
                    tenant,
                    ActivityEvent::new(
                        ActivityKind::Invoked,
                        serde_json::to_value(JobDto::from_job(job))?,
                    ),
                )
                .await;
            info!(id = %id, queue = %queue, "Invoked job");
        }
        Ok(updated)
    }

    // ── Queue directory ─────────────────────────────────────────

    /// Endpoints the tenant has ever enqueued to.
    pub async fn endpoints(&self, tenant: &TenantId) -> AppResult<Vec<String>> {
        self.store.endpoints(tenant).await
    }

    /// Pending-job counts per known endpoint.
    pub async fn queue_stats(&self, tenant: &TenantId) -> AppResult<Vec<(String, u64)>> {
        let endpoints = self.store.endpoints(tenant).await?;
        let mut stats = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let queue = QueueDescriptor::new(tenant.clone(), endpoint.clone());
            let count = self.store.pending_count(&queue).await?;
            stats.push((endpoint, count));
        }
        Ok(stats)
    }

    /// One-shot directory backfill for stores that predate the queue
    /// directory. Guarded by a sentinel; repeated calls are no-ops.
    pub async fn ensure_queue_directory(&self) -> AppResult<()> {
        if !self.store.acquire_backfill_sentinel().await? {
            return Ok(());
        }

        info!("Backfilling queue directory from existing jobs");
        let mut cursor = 0;
        let mut indexed = 0u64;
        loop {
            let page = self.store.scan_all("*", cursor, 100).await?;
            for job in &page.items {
                self.store.add_endpoint(&job.tenant, &job.endpoint).await?;
                indexed += 1;
            }
            match page.next_cursor() {
                Some(next) => cursor = next,
                None => break,
            }
        }
        info!(indexed, "Queue directory backfill complete");
        Ok(())
    }

    /// Store reachability, surfaced by the hosting layer's health
    /// endpoint.
    pub async fn health_check(&self) -> AppResult<bool> {
        let healthy = self.store.health_check().await?;
        if !healthy {
            warn!("Backing store failed health check");
        }
        Ok(healthy)
    }
}
