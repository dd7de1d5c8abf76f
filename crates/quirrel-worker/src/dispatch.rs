//! HTTP callback dispatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use quirrel_core::config::worker::WorkerConfig;
use quirrel_core::error::AppError;
use quirrel_core::result::AppResult;
use quirrel_entity::Job;
use quirrel_store::JobStore;

use crate::signing::PayloadSigner;
use crate::ssrf;

/// Signature header on every dispatched callback.
pub const SIGNATURE_HEADER: &str = "x-quirrel-signature";
/// Metadata header carrying repetition state.
pub const META_HEADER: &str = "x-quirrel-meta";

/// Result of one dispatch attempt. Transport failures (timeout,
/// connection refused, SSRF-blocked) carry status `0` and are handled
/// exactly like a non-2xx response.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The endpoint answered 2xx.
    Success {
        /// The response status.
        status: u16,
    },
    /// The endpoint answered non-2xx, or the request never completed.
    Failure {
        /// The response status; `0` when no response arrived.
        status: u16,
        /// Response body or client error text.
        body: String,
    },
}

/// Builds and sends signed callback requests.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    /// Shared HTTP client (used when no address pinning is needed).
    http: reqwest::Client,
    /// Payload signer.
    signer: Arc<PayloadSigner>,
    /// Store handle for tenant signing secrets.
    store: Arc<dyn JobStore>,
    /// Per-request timeout.
    timeout: Duration,
    /// Whether outbound destinations are vetted and pinned.
    ssrf_guard: bool,
}

impl Dispatcher {
    /// Create a dispatcher from the worker configuration.
    pub fn new(
        store: Arc<dyn JobStore>,
        signer: PayloadSigner,
        config: &WorkerConfig,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::internal(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            http,
            signer: Arc::new(signer),
            store,
            timeout: Duration::from_secs(config.request_timeout_seconds),
            ssrf_guard: config.ssrf_guard,
        })
    }

    /// POST the job's payload to its endpoint.
    ///
    /// The payload travels verbatim (it may be ciphertext); the
    /// signature covers the raw bytes and the metadata header lets the
    /// receiving handler introspect repetition state without a call
    /// back into the scheduler.
    pub async fn dispatch(
        &self,
        job: &Job,
        next_repetition: Option<DateTime<Utc>>,
    ) -> AppResult<DispatchOutcome> {
        let tenant_secret = if self.signer.wants_tenant_secret() {
            self.store.token_for_tenant(&job.tenant).await?
        } else {
            None
        };
        let signature = self.signer.sign(tenant_secret.as_deref(), &job.payload)?;

        let meta = serde_json::json!({
            "id": job.id,
            "count": job.count,
            "exclusive": job.exclusive,
            "retry": job.retry,
            "nextRepetition": next_repetition,
        })
        .to_string();

        let client = match self.pinned_client(job).await? {
            PinOutcome::Shared => self.http.clone(),
            PinOutcome::Pinned(client) => client,
            PinOutcome::Refused(reason) => {
                debug!(endpoint = %job.endpoint, %reason, "Dispatch refused by SSRF guard");
                return Ok(DispatchOutcome::Failure {
                    status: 0,
                    body: reason,
                });
            }
        };

        let response = client
            .post(&job.endpoint)
            .header(SIGNATURE_HEADER, signature)
            .header(META_HEADER, meta)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .timeout(self.timeout)
            .body(job.payload.clone())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    Ok(DispatchOutcome::Success { status })
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Ok(DispatchOutcome::Failure { status, body })
                }
            }
            Err(e) => Ok(DispatchOutcome::Failure {
                status: 0,
                body: e.to_string(),
            }),
        }
    }

    /// Vet and pin the destination when the SSRF guard is on.
    async fn pinned_client(&self, job: &Job) -> AppResult<PinOutcome> {
        if !self.ssrf_guard {
            return Ok(PinOutcome::Shared);
        }

        let url = match Url::parse(&job.endpoint) {
            Ok(url) => url,
            Err(e) => return Ok(PinOutcome::Refused(format!("Unparseable endpoint: {e}"))),
        };
        let Some(host) = url.host_str().map(String::from) else {
            return Ok(PinOutcome::Refused("Endpoint URL has no host".to_string()));
        };

        match ssrf::resolve_public(&url).await {
            Ok(addr) => {
                let client = reqwest::Client::builder()
                    .resolve(&host, addr)
                    .build()
                    .map_err(|e| {
                        AppError::internal(format!("Pinned HTTP client setup failed: {e}"))
                    })?;
                Ok(PinOutcome::Pinned(client))
            }
            Err(e) => Ok(PinOutcome::Refused(e.message)),
        }
    }
}

enum PinOutcome {
    /// Guard disabled, use the shared client.
    Shared,
    /// Guard passed, use this client with the vetted address pinned.
    Pinned(reqwest::Client),
    /// Guard refused the destination.
    Refused(String),
}
