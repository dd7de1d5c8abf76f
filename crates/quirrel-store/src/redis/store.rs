//! Redis-backed [`JobStore`] implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::debug;

use quirrel_core::error::{AppError, ErrorKind};
use quirrel_core::result::AppResult;
use quirrel_core::types::{QueueDescriptor, ScanPage, TenantId};
use quirrel_entity::Job;

use crate::keys;
use crate::traits::{JobStore, PutOutcome};

use super::client::RedisStoreClient;
use super::scripts::Scripts;

/// Redis-backed store provider.
#[derive(Clone)]
pub struct RedisJobStore {
    /// Redis client.
    client: RedisStoreClient,
    /// Precompiled Lua scripts.
    scripts: Scripts,
}

impl fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("prefix", &self.client.prefix())
            .finish()
    }
}

impl RedisJobStore {
    /// Create a store on top of an established client.
    pub fn new(client: RedisStoreClient) -> Self {
        Self {
            client,
            scripts: Scripts::new(),
        }
    }

    /// Map a Redis error to an AppError.
    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Store, format!("Redis error: {e}"), e)
    }

    fn job_hash_key(&self, queue: &QueueDescriptor) -> String {
        self.client.prefixed_key(&keys::job_hash(&queue.encode()))
    }

    fn job_hash_prefix(&self) -> String {
        self.client.prefixed_key(&keys::job_hash(""))
    }

    fn due_key(&self) -> String {
        self.client.prefixed_key(&keys::due_index())
    }

    fn inflight_key(&self) -> String {
        self.client.prefixed_key(&keys::inflight_index())
    }

    fn parse_job(json: &str) -> AppResult<Job> {
        serde_json::from_str(json)
            .map_err(|e| AppError::with_source(ErrorKind::Serialization, "Corrupt job record", e))
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn put_job(&self, job: &Job, replace: bool) -> AppResult<PutOutcome> {
        let queue = job.descriptor();
        let mut conn = self.client.conn_mut();

        let result: Vec<String> = self
            .scripts
            .put_job
            .key(self.job_hash_key(&queue))
            .key(self.due_key())
            .key(self.inflight_key())
            .arg(keys::encode_component(&job.id))
            .arg(if replace { "1" } else { "0" })
            .arg(serde_json::to_string(job)?)
            .arg(job.run_at.timestamp_millis())
            .arg(queue.job_member(&job.id))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        match result.first().map(String::as_str) {
            Some("created") => Ok(PutOutcome::Created),
            Some("replaced") => {
                debug!(id = %job.id, queue = %queue, "Replaced job");
                Ok(PutOutcome::Replaced)
            }
            Some("exists") => {
                let stored = result
                    .get(1)
                    .ok_or_else(|| AppError::store("put_job returned 'exists' without record"))?;
                Ok(PutOutcome::Exists(Self::parse_job(stored)?))
            }
            other => Err(AppError::store(format!(
                "Unexpected put_job reply: {other:?}"
            ))),
        }
    }

    async fn get_job(&self, queue: &QueueDescriptor, id: &str) -> AppResult<Option<Job>> {
        let mut conn = self.client.conn_mut();
        let json: Option<String> = conn
            .hget(self.job_hash_key(queue), keys::encode_component(id))
            .await
            .map_err(Self::map_err)?;
        json.as_deref().map(Self::parse_job).transpose()
    }

    async fn delete_job(&self, queue: &QueueDescriptor, id: &str) -> AppResult<Option<Job>> {
        let mut conn = self.client.conn_mut();
        let removed: Option<String> = self
            .scripts
            .delete_job
            .key(self.job_hash_key(queue))
            .key(self.due_key())
            .key(self.inflight_key())
            .arg(keys::encode_component(id))
            .arg(queue.job_member(id))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        removed.as_deref().map(Self::parse_job).transpose()
    }

    async fn update_run_at(
        &self,
        queue: &QueueDescriptor,
        id: &str,
        run_at: DateTime<Utc>,
    ) -> AppResult<Option<Job>> {
        // Read-modify-write with a compare-and-swap script; retried on
        // the rare lost race with a concurrent mutation.
        const CAS_ATTEMPTS: usize = 5;

        let mut conn = self.client.conn_mut();
        let field = keys::encode_component(id);
        let member = queue.job_member(id);

        for _ in 0..CAS_ATTEMPTS {
            let current: Option<String> = conn
                .hget(self.job_hash_key(queue), &field)
                .await
                .map_err(Self::map_err)?;
            let Some(current) = current else {
                return Ok(None);
            };

            let mut job = Self::parse_job(&current)?;
            job.run_at = run_at;
            let updated = serde_json::to_string(&job)?;

            let swapped: Option<i64> = self
                .scripts
                .cas_job
                .key(self.job_hash_key(queue))
                .key(self.due_key())
                .key(self.inflight_key())
                .arg(&field)
                .arg(&current)
                .arg(&updated)
                .arg(&member)
                .arg(run_at.timestamp_millis())
                .invoke_async(&mut conn)
                .await
                .map_err(Self::map_err)?;

            match swapped {
                None => return Ok(None),
                Some(1) => return Ok(Some(job)),
                Some(_) => continue,
            }
        }

        Err(AppError::conflict(format!(
            "Job '{id}' kept changing during update"
        )))
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> AppResult<Vec<Job>> {
        let mut conn = self.client.conn_mut();
        let claimed: Vec<String> = self
            .scripts
            .claim_due
            .key(self.due_key())
            .key(self.inflight_key())
            .arg(now.timestamp_millis())
            .arg(limit)
            .arg(self.job_hash_prefix())
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        claimed.iter().map(|json| Self::parse_job(json)).collect()
    }

    async fn requeue(&self, job: &Job) -> AppResult<()> {
        let queue = job.descriptor();
        let mut conn = self.client.conn_mut();
        let _: () = self
            .scripts
            .requeue
            .key(self.job_hash_key(&queue))
            .key(self.due_key())
            .key(self.inflight_key())
            .arg(keys::encode_component(&job.id))
            .arg(serde_json::to_string(job)?)
            .arg(queue.job_member(&job.id))
            .arg(job.run_at.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn ack_delete(&self, queue: &QueueDescriptor, id: &str) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: () = self
            .scripts
            .ack_delete
            .key(self.job_hash_key(queue))
            .key(self.due_key())
            .key(self.inflight_key())
            .arg(keys::encode_component(id))
            .arg(queue.job_member(id))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>, lease: Duration) -> AppResult<u64> {
        let mut conn = self.client.conn_mut();
        let cutoff = now.timestamp_millis() - lease.as_millis() as i64;
        let reclaimed: u64 = self
            .scripts
            .reclaim
            .key(self.inflight_key())
            .key(self.due_key())
            .arg(cutoff)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        if reclaimed > 0 {
            debug!(reclaimed, "Returned lease-expired jobs to the due index");
        }
        Ok(reclaimed)
    }

    async fn scan_queue(
        &self,
        queue: &QueueDescriptor,
        cursor: u64,
        count: usize,
    ) -> AppResult<ScanPage<Job>> {
        let mut conn = self.client.conn_mut();
        let (next_cursor, entries): (u64, Vec<String>) = redis::cmd("HSCAN")
            .arg(self.job_hash_key(queue))
            .arg(cursor)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        // HSCAN yields alternating field/value pairs; values are records.
        let items: AppResult<Vec<Job>> = entries
            .chunks(2)
            .filter_map(|pair| pair.get(1))
            .map(|json| Self::parse_job(json))
            .collect();

        Ok(ScanPage {
            items: items?,
            cursor: next_cursor,
        })
    }

    async fn scan_all(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> AppResult<ScanPage<Job>> {
        let mut conn = self.client.conn_mut();
        let match_pattern = format!("{}{pattern}", self.job_hash_prefix());

        let (next_cursor, hash_keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&match_pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        let mut items = Vec::new();
        for key in &hash_keys {
            let records: Vec<String> = conn.hvals(key).await.map_err(Self::map_err)?;
            for json in &records {
                items.push(Self::parse_job(json)?);
            }
        }

        Ok(ScanPage {
            items,
            cursor: next_cursor,
        })
    }

    async fn try_acquire_lock(&self, queue: &QueueDescriptor, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let key = self
            .client
            .prefixed_key(&keys::queue_lock(&queue.encode()));

        // SET key 1 PX ttl NX
        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(acquired.is_some())
    }

    async fn release_lock(&self, queue: &QueueDescriptor) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let key = self
            .client
            .prefixed_key(&keys::queue_lock(&queue.encode()));
        let _: () = conn.del(&key).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn put_token(&self, token: &str, tenant: &TenantId) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: () = self
            .scripts
            .put_token
            .key(self.client.prefixed_key(&keys::token(token)))
            .key(self.client.prefixed_key(&keys::tenant_token(tenant.as_str())))
            .arg(tenant.as_str())
            .arg(token)
            .arg(self.client.prefixed_key("token:"))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn tenant_for_token(&self, token: &str) -> AppResult<Option<TenantId>> {
        let mut conn = self.client.conn_mut();
        let tenant: Option<String> = conn
            .get(self.client.prefixed_key(&keys::token(token)))
            .await
            .map_err(Self::map_err)?;
        Ok(tenant.map(TenantId::new))
    }

    async fn token_for_tenant(&self, tenant: &TenantId) -> AppResult<Option<String>> {
        let mut conn = self.client.conn_mut();
        let token: Option<String> = conn
            .get(self.client.prefixed_key(&keys::tenant_token(tenant.as_str())))
            .await
            .map_err(Self::map_err)?;
        Ok(token)
    }

    async fn revoke_token(&self, token: &str) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let revoked: i64 = self
            .scripts
            .revoke_token
            .key(self.client.prefixed_key(&keys::token(token)))
            .arg(self.client.prefixed_key(&keys::tenant_token_prefix()))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(revoked == 1)
    }

    async fn incr_usage(&self, tenant: &TenantId) -> AppResult<i64> {
        let mut conn = self.client.conn_mut();
        let count: i64 = conn
            .hincr(self.client.prefixed_key(&keys::usage()), tenant.as_str(), 1)
            .await
            .map_err(Self::map_err)?;
        Ok(count)
    }

    async fn read_and_reset_usage(&self) -> AppResult<Vec<(TenantId, i64)>> {
        let mut conn = self.client.conn_mut();
        let flat: Vec<String> = self
            .scripts
            .drain_usage
            .key(self.client.prefixed_key(&keys::usage()))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        flat.chunks(2)
            .filter_map(|pair| match pair {
                [tenant, count] => Some((tenant, count)),
                _ => None,
            })
            .map(|(tenant, count)| {
                count
                    .parse::<i64>()
                    .map(|count| (TenantId::new(tenant.clone()), count))
                    .map_err(|e| {
                        AppError::store(format!("Corrupt usage counter for '{tenant}': {e}"))
                    })
            })
            .collect()
    }

    async fn add_endpoint(&self, tenant: &TenantId, endpoint: &str) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: () = conn
            .sadd(
                self.client.prefixed_key(&keys::endpoints(tenant.as_str())),
                endpoint,
            )
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn endpoints(&self, tenant: &TenantId) -> AppResult<Vec<String>> {
        let mut conn = self.client.conn_mut();
        let members: Vec<String> = conn
            .smembers(self.client.prefixed_key(&keys::endpoints(tenant.as_str())))
            .await
            .map_err(Self::map_err)?;
        Ok(members)
    }

    async fn pending_count(&self, queue: &QueueDescriptor) -> AppResult<u64> {
        let mut conn = self.client.conn_mut();
        let count: u64 = conn
            .hlen(self.job_hash_key(queue))
            .await
            .map_err(Self::map_err)?;
        Ok(count)
    }

    async fn acquire_backfill_sentinel(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let key = self.client.prefixed_key(&keys::directory_sentinel());
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(set.is_some())
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}
