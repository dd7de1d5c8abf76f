//! Producer API configuration.

use serde::{Deserialize, Serialize};

/// Producer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Maximum number of jobs accepted in a single batch enqueue.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Default page size for queue scans.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            scan_count: default_scan_count(),
        }
    }
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_scan_count() -> usize {
    50
}
