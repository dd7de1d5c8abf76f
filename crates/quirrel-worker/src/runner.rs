//! Delivery worker — claims due jobs and drives each to an outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{watch, Semaphore};
use tokio::time;
use tracing::{debug, error, info, warn};

use quirrel_core::config::worker::WorkerConfig;
use quirrel_core::events::{ActivityEvent, ActivityKind};
use quirrel_core::result::AppResult;
use quirrel_core::traits::TelemetryReporter;
use quirrel_entity::{IncidentReport, Job, JobDto};
use quirrel_realtime::ActivityPublisher;
use quirrel_scheduler::compute_next_run_at;
use quirrel_store::JobStore;

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::incident::IncidentReporter;

/// Base delay before re-examining a deferred exclusive claim.
const DEFER_BASE_MS: u64 = 500;
/// Ceiling for the deferral backoff.
const DEFER_CAP_MS: u64 = 30_000;

/// Backoff for the `attempt`-th consecutive deferral of a queue:
/// bounded exponential, 500 ms doubling up to 30 s.
fn deferral_backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    Duration::from_millis((DEFER_BASE_MS << exp).min(DEFER_CAP_MS))
}

/// The delivery worker.
///
/// Claiming and dispatch are decoupled: each claimed job is processed
/// on its own task under a shared concurrency limit, so one slow remote
/// endpoint cannot stall other queues' claims. Any number of worker
/// instances may run against the same store — every state transition is
/// a single atomic store operation.
#[derive(Debug, Clone)]
pub struct DeliveryWorker {
    /// The backing store.
    store: Arc<dyn JobStore>,
    /// Callback dispatcher.
    dispatcher: Dispatcher,
    /// Activity fan-out.
    activity: Arc<ActivityPublisher>,
    /// Incident forwarding, when configured.
    incidents: Option<IncidentReporter>,
    /// Optional telemetry seam.
    reporter: Option<Arc<dyn TelemetryReporter>>,
    /// Worker configuration.
    config: WorkerConfig,
    /// Consecutive deferral counts per queue, for lock backoff.
    deferrals: Arc<DashMap<String, u32>>,
}

impl DeliveryWorker {
    /// Create a worker.
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Dispatcher,
        activity: Arc<ActivityPublisher>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            activity,
            incidents: None,
            reporter: None,
            config,
            deferrals: Arc::new(DashMap::new()),
        }
    }

    /// Attach an incident reporter.
    pub fn with_incidents(mut self, incidents: IncidentReporter) -> Self {
        self.incidents = Some(incidents);
        self
    }

    /// Attach a telemetry reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn TelemetryReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Run until the cancel signal is received, then drain in-flight
    /// dispatches with a bounded wait.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Delivery worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        info!("Delivery worker received shutdown signal");
                        break;
                    }
                }
                _ = self.claim_cycle(&semaphore) => {
                    tokio::select! {
                        _ = cancel.changed() => {
                            if *cancel.borrow() {
                                info!("Delivery worker shutting down");
                                break;
                            }
                        }
                        _ = time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        info!("Delivery worker waiting for in-flight dispatches to complete...");
        let max_permits = self.config.concurrency as u32;
        let _ = tokio::time::timeout(
            Duration::from_secs(30),
            semaphore.acquire_many(max_permits),
        )
        .await;
        info!("Delivery worker shut down complete");
    }

    /// One poll: reclaim lease-expired jobs, claim everything due, and
    /// spawn a dispatch task per claimed job.
    async fn claim_cycle(&self, semaphore: &Arc<Semaphore>) {
        let now = Utc::now();
        let lease = Duration::from_secs(self.config.lease_seconds);

        if let Err(e) = self.store.reclaim_expired(now, lease).await {
            error!(error = %e, "Reclaim pass failed");
        }

        let claimed = match self.store.claim_due(now, self.config.claim_batch_size).await {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(error = %e, "Claim pass failed");
                return;
            }
        };

        for job in claimed {
            let permit = match Arc::clone(semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let worker = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                worker.process(job).await;
            });
        }
    }

    /// Drive one claimed job to its outcome.
    async fn process(&self, job: Job) {
        let queue = job.descriptor();

        // The per-queue exclusivity lock is the system's only
        // concurrency-control point. A held lock defers the claim
        // instead of executing concurrently.
        let mut locked = false;
        if job.exclusive {
            let lock_ttl = Duration::from_secs(self.config.lease_seconds);
            match self.store.try_acquire_lock(&queue, lock_ttl).await {
                Ok(true) => {
                    locked = true;
                    self.deferrals.remove(&queue.encode());
                }
                Ok(false) => {
                    self.defer(&job).await;
                    return;
                }
                Err(e) => {
                    error!(id = %job.id, queue = %queue, error = %e, "Lock acquisition failed");
                    return;
                }
            }
        }

        self.publish(&job, ActivityKind::Started).await;

        let next_repetition = job.schedule.as_ref().and_then(|schedule| {
            compute_next_run_at(schedule, job.run_at, job.count + 1)
                .ok()
                .flatten()
        });

        let result = match self.dispatcher.dispatch(&job, next_repetition).await {
            Ok(DispatchOutcome::Success { status }) => self.handle_success(&job, status).await,
            Ok(DispatchOutcome::Failure { status, body }) => {
                self.handle_failure(&job, status, &body).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            // The job stays in the in-flight set; the lease reclaim
            // pass returns it to the due index rather than losing it.
            error!(id = %job.id, queue = %queue, error = %e, "Outcome handling failed, job left reclaimable");
        }

        if locked {
            if let Err(e) = self.store.release_lock(&queue).await {
                error!(queue = %queue, error = %e, "Lock release failed");
            }
        }
    }

    /// A 2xx response: advance the repetition or retire the job.
    async fn handle_success(&self, job: &Job, status: u16) -> AppResult<()> {
        let queue = job.descriptor();

        if let Some(reporter) = &self.reporter {
            reporter.job_dispatched(&job.tenant, status);
        }
        // Metering is a side effect, not a dependency of delivery.
        if let Err(e) = self.store.incr_usage(&job.tenant).await {
            warn!(tenant = %job.tenant, error = %e, "Usage metering failed");
        }

        self.publish(job, ActivityKind::Completed).await;

        match &job.schedule {
            Some(schedule) => {
                let next_count = job.count + 1;
                match compute_next_run_at(schedule, job.run_at, next_count) {
                    Ok(Some(next)) => {
                        let mut updated = job.clone();
                        updated.run_at = next;
                        updated.count = next_count;
                        self.store.requeue(&updated).await?;
                        self.publish(&updated, ActivityKind::Rescheduled).await;
                        debug!(id = %job.id, queue = %queue, next = %next, "Rescheduled repetition");
                    }
                    Ok(None) => {
                        self.store.ack_delete(&queue, &job.id).await?;
                        debug!(id = %job.id, queue = %queue, "Repetition count exhausted");
                    }
                    Err(e) => {
                        warn!(id = %job.id, queue = %queue, error = %e, "Schedule no longer evaluable, retiring job");
                        self.store.ack_delete(&queue, &job.id).await?;
                    }
                }
            }
            None => {
                self.store.ack_delete(&queue, &job.id).await?;
                debug!(id = %job.id, queue = %queue, "Job completed");
            }
        }
        Ok(())
    }

    /// A non-2xx response or transport failure: retry, advance the
    /// repetition, or retire with an incident.
    async fn handle_failure(&self, job: &Job, status: u16, body: &str) -> AppResult<()> {
        let queue = job.descriptor();

        if let Some(reporter) = &self.reporter {
            reporter.job_dispatched(&job.tenant, status);
        }

        match &job.schedule {
            Some(schedule) => {
                // Repeating jobs have no retry plan: the failure is
                // reported immediately and the repetition advances.
                self.file_incident(job, status, body);

                if status == 404 {
                    // The endpoint no longer exists; end the repetition
                    // regardless of remaining executions.
                    self.store.ack_delete(&queue, &job.id).await?;
                    self.publish(job, ActivityKind::Deleted).await;
                    info!(id = %job.id, queue = %queue, "Repetition ended by 404");
                    return Ok(());
                }

                let next_count = job.count + 1;
                match compute_next_run_at(schedule, job.run_at, next_count) {
                    Ok(Some(next)) => {
                        let mut updated = job.clone();
                        updated.run_at = next;
                        updated.count = next_count;
                        self.store.requeue(&updated).await?;
                        self.publish(&updated, ActivityKind::Rescheduled).await;
                    }
                    Ok(None) | Err(_) => {
                        self.store.ack_delete(&queue, &job.id).await?;
                        self.publish(job, ActivityKind::Deleted).await;
                    }
                }
            }
            None => {
                let consumed = job.retry_cursor as usize;
                if consumed < job.retry.len() {
                    let delay = job.retry[consumed];
                    let mut updated = job.clone();
                    updated.retry_cursor += 1;
                    updated.run_at = Utc::now() + chrono::Duration::milliseconds(delay as i64);
                    self.store.requeue(&updated).await?;
                    self.publish(&updated, ActivityKind::Rescheduled).await;
                    debug!(
                        id = %job.id,
                        queue = %queue,
                        status,
                        retry_in_ms = delay,
                        "Delivery failed, retrying"
                    );
                } else {
                    self.file_incident(job, status, body);
                    self.store.ack_delete(&queue, &job.id).await?;
                    self.publish(job, ActivityKind::Deleted).await;
                    info!(id = %job.id, queue = %queue, status, "Retries exhausted, job retired");
                }
            }
        }
        Ok(())
    }

    /// Requeue an exclusive job that lost the lock race, with bounded
    /// exponential backoff per queue.
    async fn defer(&self, job: &Job) {
        let queue = job.descriptor();
        let attempt = {
            let mut entry = self.deferrals.entry(queue.encode()).or_insert(0);
            *entry += 1;
            *entry
        };
        let backoff = deferral_backoff(attempt);

        let mut deferred = job.clone();
        deferred.run_at = Utc::now() + chrono::Duration::milliseconds(backoff.as_millis() as i64);

        if let Err(e) = self.store.requeue(&deferred).await {
            error!(id = %job.id, queue = %queue, error = %e, "Deferral requeue failed, job left reclaimable");
            return;
        }
        debug!(
            id = %job.id,
            queue = %queue,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            "Exclusive queue busy, claim deferred"
        );
    }

    /// Forward an incident, fire-and-forget.
    fn file_incident(&self, job: &Job, status: u16, body: &str) {
        if let Some(reporter) = &self.reporter {
            reporter.incident_reported(&job.tenant);
        }
        match &self.incidents {
            Some(incidents) => {
                incidents.report(IncidentReport::new(JobDto::from_job(job), status, body));
            }
            None => {
                debug!(id = %job.id, status, "No incident receiver configured, report dropped");
            }
        }
    }

    async fn publish(&self, job: &Job, kind: ActivityKind) {
        let payload = match kind {
            ActivityKind::Started | ActivityKind::Completed | ActivityKind::Deleted => {
                JobDto::reference(&job.endpoint, &job.id)
            }
            _ => match serde_json::to_value(JobDto::from_job(job)) {
                Ok(value) => value,
                Err(_) => JobDto::reference(&job.endpoint, &job.id),
            },
        };
        self.activity
            .publish(&job.tenant, ActivityEvent::new(kind, payload))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferral_backoff_doubles_to_cap() {
        assert_eq!(deferral_backoff(1), Duration::from_millis(500));
        assert_eq!(deferral_backoff(2), Duration::from_millis(1_000));
        assert_eq!(deferral_backoff(3), Duration::from_millis(2_000));
        assert_eq!(deferral_backoff(7), Duration::from_millis(30_000));
        assert_eq!(deferral_backoff(100), Duration::from_millis(30_000));
    }
}
