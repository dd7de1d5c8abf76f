//! Delivery worker configuration.

use serde::{Deserialize, Serialize};

/// Delivery worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of in-flight HTTP dispatches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Interval in milliseconds between due-index polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Maximum number of jobs claimed per poll.
    #[serde(default = "default_claim_batch")]
    pub claim_batch_size: usize,
    /// Timeout in seconds for a single callback dispatch.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Seconds after which a claimed-but-unfinished job is reclaimable.
    #[serde(default = "default_lease")]
    pub lease_seconds: u64,
    /// Refuse dispatch to private/internal network destinations.
    #[serde(default)]
    pub ssrf_guard: bool,
    /// Where retry-exhausted and repeating-job failures are reported.
    #[serde(default)]
    pub incident_receiver: Option<IncidentReceiverConfig>,
}

/// Incident receiver endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReceiverConfig {
    /// Absolute URL the incident report is POSTed to.
    pub endpoint: String,
    /// Shared passphrase sent as a bearer credential.
    pub passphrase: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            claim_batch_size: default_claim_batch(),
            request_timeout_seconds: default_request_timeout(),
            lease_seconds: default_lease(),
            ssrf_guard: false,
            incident_receiver: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    100
}

fn default_poll_interval() -> u64 {
    500
}

fn default_claim_batch() -> usize {
    100
}

fn default_request_timeout() -> u64 {
    30
}

fn default_lease() -> u64 {
    300
}
