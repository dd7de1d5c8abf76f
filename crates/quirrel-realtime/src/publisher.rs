//! Per-tenant activity publisher.

use std::collections::HashMap;

use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tracing::trace;

use quirrel_core::events::ActivityEvent;
use quirrel_core::types::TenantId;

/// Fan-out of activity events to per-tenant subscribers.
///
/// Publishing is non-blocking: a send to a channel with no subscribers
/// (or with subscribers that fell behind the buffer) is silently
/// dropped, so a slow dashboard can never apply backpressure to the
/// delivery worker.
#[derive(Debug)]
pub struct ActivityPublisher {
    /// Tenant → broadcast sender of wire-encoded events.
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
    /// Buffer size for channels.
    buffer_size: usize,
}

impl ActivityPublisher {
    /// Create a publisher with the given per-channel buffer.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            buffer_size,
        }
    }

    /// Publish an event on the tenant's channel.
    pub async fn publish(&self, tenant: &TenantId, event: ActivityEvent) {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(tenant.as_str()) {
            let _ = tx.send(event.to_wire());
        } else {
            trace!(tenant = %tenant, kind = event.kind.as_str(), "No subscribers, event dropped");
        }
    }

    /// Subscribe to a tenant's channel, returns a receiver of
    /// wire-encoded `[type, payload]` tuples.
    pub async fn subscribe(&self, tenant: &TenantId) -> broadcast::Receiver<String> {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(tenant.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0);
        tx.subscribe()
    }
}
