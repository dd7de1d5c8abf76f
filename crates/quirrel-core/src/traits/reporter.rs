//! Telemetry reporter seam.
//!
//! The producer and the delivery worker accept an optional reporter at
//! construction time. There is no process-wide telemetry state; hosts
//! that want metrics inject an implementation, everyone else passes
//! `None`.

use crate::types::TenantId;

/// Receives counters for the producer/worker hot paths.
///
/// Implementations must be cheap and non-blocking; they are called
/// inline from the dispatch path.
pub trait TelemetryReporter: Send + Sync + std::fmt::Debug {
    /// A job was accepted by the producer.
    fn job_enqueued(&self, tenant: &TenantId);

    /// A dispatch attempt finished with the given HTTP status
    /// (`0` for transport failures).
    fn job_dispatched(&self, tenant: &TenantId, status: u16);

    /// An incident report was forwarded.
    fn incident_reported(&self, tenant: &TenantId);
}
