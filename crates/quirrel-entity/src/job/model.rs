//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quirrel_core::types::{QueueDescriptor, TenantId};

/// The unit of schedulable work: an HTTP callback to be delivered at
/// `run_at`, possibly on a repeating schedule.
///
/// `(id, queue)` is unique; the id doubles as the idempotency key for
/// enqueues. Only the scheduling engine advances `run_at` and `count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique id within the queue. Caller-supplied or generated (UUID).
    pub id: String,
    /// The tenant owning the job.
    pub tenant: TenantId,
    /// Absolute HTTP destination the payload is POSTed to.
    pub endpoint: String,
    /// Opaque payload (may be ciphertext); never inspected or decrypted.
    pub payload: String,
    /// Next due execution time.
    pub run_at: DateTime<Utc>,
    /// If true, no other job on the same queue may execute concurrently.
    pub exclusive: bool,
    /// Delays in milliseconds applied after consecutive failures of a
    /// non-repeating job, consumed left to right.
    pub retry: Vec<u64>,
    /// How many entries of `retry` have been consumed.
    pub retry_cursor: u32,
    /// 1-based counter of executions this job identity has had (or is
    /// about to have). Never decreases.
    pub count: u32,
    /// Repetition descriptor; `None` for one-shot jobs.
    pub schedule: Option<Schedule>,
}

impl Job {
    /// The queue descriptor this job belongs to.
    pub fn descriptor(&self) -> QueueDescriptor {
        QueueDescriptor::new(self.tenant.clone(), self.endpoint.clone())
    }

    /// Whether the job repeats.
    pub fn is_repeating(&self) -> bool {
        self.schedule.is_some()
    }
}

/// Repetition descriptor attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Interval or cron repetition.
    #[serde(flatten)]
    pub kind: ScheduleKind,
    /// Cap on total executions; `None` = unbounded.
    pub times: Option<u32>,
}

/// The two repetition modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduleKind {
    /// Fixed interval in milliseconds.
    Every {
        /// Milliseconds between executions.
        interval_ms: u64,
    },
    /// Cron expression evaluated in an IANA timezone.
    Cron {
        /// The cron expression (five or six fields, `L` supported).
        expr: String,
        /// IANA timezone name the expression is evaluated in.
        timezone: String,
    },
}
