//! Activity stream configuration.

use serde::{Deserialize, Serialize};

/// Activity stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Buffer size of each per-tenant broadcast channel. A subscriber
    /// that falls further behind than this loses events, never blocks
    /// the publisher.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
        }
    }
}

fn default_channel_buffer() -> usize {
    256
}
