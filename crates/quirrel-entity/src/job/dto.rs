//! Wire DTOs for the producer API.
//!
//! [`JobDto`] is the shape returned by every read; it round-trips: any
//! DTO returned by the producer is schema-valid input to `enqueue` when
//! re-submitted unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Job, ScheduleKind};

/// Job representation returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    /// The job id (idempotency key).
    pub id: String,
    /// The queue's HTTP destination.
    pub endpoint: String,
    /// The opaque payload.
    pub body: String,
    /// Next due execution time, ISO-8601.
    pub run_at: DateTime<Utc>,
    /// Per-queue exclusivity flag.
    pub exclusive: bool,
    /// Retry delays in milliseconds.
    pub retry: Vec<u64>,
    /// 1-based execution counter.
    pub count: u32,
    /// Repetition state, when the job repeats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatDto>,
}

/// Repetition state of a repeating job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatDto {
    /// Interval in milliseconds, for `every` schedules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub every: Option<u64>,
    /// Execution cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub times: Option<u32>,
    /// Executions so far (mirrors the job counter).
    pub count: u32,
    /// Cron expression, for `cron` schedules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// IANA timezone the cron expression is evaluated in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_timezone: Option<String>,
}

impl JobDto {
    /// Build the wire shape from a stored job.
    pub fn from_job(job: &Job) -> Self {
        let repeat = job.schedule.as_ref().map(|schedule| {
            let (every, cron, cron_timezone) = match &schedule.kind {
                ScheduleKind::Every { interval_ms } => (Some(*interval_ms), None, None),
                ScheduleKind::Cron { expr, timezone } => {
                    (None, Some(expr.clone()), Some(timezone.clone()))
                }
            };
            RepeatDto {
                every,
                times: schedule.times,
                count: job.count,
                cron,
                cron_timezone,
            }
        });

        Self {
            id: job.id.clone(),
            endpoint: job.endpoint.clone(),
            body: job.payload.clone(),
            run_at: job.run_at,
            exclusive: job.exclusive,
            retry: job.retry.clone(),
            count: job.count,
            repeat,
        }
    }

    /// A minimal `{endpoint, id}` reference for activity events.
    pub fn reference(endpoint: &str, id: &str) -> serde_json::Value {
        serde_json::json!({ "endpoint": endpoint, "id": id })
    }
}

/// Input accepted by `enqueue`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnqueueRequest {
    /// Caller-supplied id; generated when absent.
    pub id: Option<String>,
    /// The opaque payload to deliver.
    pub body: String,
    /// Explicit due time; takes precedence over `delay`.
    pub run_at: Option<DateTime<Utc>>,
    /// Delay in milliseconds from now.
    pub delay: Option<u64>,
    /// Repetition descriptor.
    pub repeat: Option<RepeatRequest>,
    /// Per-queue exclusivity.
    pub exclusive: bool,
    /// Replace an existing job with the same id instead of returning it.
    #[serde(rename = "override")]
    pub override_existing: bool,
    /// Retry delays in milliseconds for non-repeating jobs.
    pub retry: Vec<u64>,
}

/// Repetition input on `enqueue`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepeatRequest {
    /// Interval in milliseconds.
    pub every: Option<u64>,
    /// Cron expression.
    pub cron: Option<String>,
    /// IANA timezone for the cron expression; defaults to UTC.
    pub cron_timezone: Option<String>,
    /// Cap on total executions; must be at least 1 when present.
    pub times: Option<u32>,
    /// Accepted (and ignored) so a returned DTO re-submits cleanly.
    pub count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::model::Schedule;
    use quirrel_core::types::TenantId;

    fn sample_job() -> Job {
        Job {
            id: "j1".to_string(),
            tenant: TenantId::new("t1"),
            endpoint: "https://example.com/hook".to_string(),
            payload: "{\"hello\":true}".to_string(),
            run_at: Utc::now(),
            exclusive: true,
            retry: vec![10, 100],
            retry_cursor: 0,
            count: 2,
            schedule: Some(Schedule {
                kind: ScheduleKind::Every { interval_ms: 60_000 },
                times: Some(5),
            }),
        }
    }

    #[test]
    fn test_dto_carries_repeat_state() {
        let dto = JobDto::from_job(&sample_job());
        let repeat = dto.repeat.expect("repeating job has repeat block");
        assert_eq!(repeat.every, Some(60_000));
        assert_eq!(repeat.times, Some(5));
        assert_eq!(repeat.count, 2);
        assert!(repeat.cron.is_none());
    }

    #[test]
    fn test_dto_reparses_as_enqueue_input() {
        let dto = JobDto::from_job(&sample_job());
        let wire = serde_json::to_string(&dto).unwrap();
        let request: EnqueueRequest = serde_json::from_str(&wire).unwrap();
        assert_eq!(request.id.as_deref(), Some("j1"));
        assert_eq!(request.body, "{\"hello\":true}");
        assert!(request.run_at.is_some());
        assert_eq!(request.repeat.unwrap().every, Some(60_000));
    }
}
