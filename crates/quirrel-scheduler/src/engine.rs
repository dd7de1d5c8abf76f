//! Due-time computation.
//!
//! `compute_initial_run_at` decides when a freshly enqueued job first
//! executes; `compute_next_run_at` decides when a repeating job executes
//! again after a completed attempt. Both are pure — callers pass `now`.

use chrono::{DateTime, Duration, Utc};

use quirrel_entity::{RepeatRequest, Schedule, ScheduleKind};

use crate::cron::TimedCron;
use crate::error::ScheduleError;

/// Compute the first due time of a job.
///
/// Precedence for the base time: explicit `run_at` > `now + delay` >
/// `now`. A cron repetition overrides the result with the next
/// occurrence **strictly after** the base time, evaluated in the cron's
/// embedded timezone. An `every` repetition without `run_at`/`delay`
/// fires immediately.
///
/// A `run_at` in the past is accepted as-is; clock skew causes immediate
/// execution, not an error.
pub fn compute_initial_run_at(
    now: DateTime<Utc>,
    run_at: Option<DateTime<Utc>>,
    delay_ms: Option<u64>,
    schedule: Option<&Schedule>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let base = match (run_at, delay_ms) {
        (Some(at), _) => at,
        (None, Some(ms)) => now + Duration::milliseconds(ms as i64),
        (None, None) => now,
    };

    match schedule.map(|s| &s.kind) {
        Some(ScheduleKind::Cron { expr, timezone }) => {
            TimedCron::parse(expr, Some(timezone))?.next_after(base)
        }
        _ => Ok(base),
    }
}

/// Compute the due time of execution number `next_count`, or `None`
/// once the schedule's execution cap is exhausted.
pub fn compute_next_run_at(
    schedule: &Schedule,
    last_run_at: DateTime<Utc>,
    next_count: u32,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    if let Some(times) = schedule.times {
        if next_count > times {
            return Ok(None);
        }
    }

    match &schedule.kind {
        ScheduleKind::Every { interval_ms } => {
            Ok(Some(last_run_at + Duration::milliseconds(*interval_ms as i64)))
        }
        ScheduleKind::Cron { expr, timezone } => {
            TimedCron::parse(expr, Some(timezone))?.next_after(last_run_at).map(Some)
        }
    }
}

/// Validate repeat input and build the stored schedule.
///
/// Rejected synchronously, never stored: `times = 0`, `every = 0`,
/// both-or-neither of `every`/`cron`, unparseable expressions, unknown
/// timezones. A `;tz` suffix embedded in the cron string takes
/// precedence over the separate timezone field.
pub fn validate_repeat(request: &RepeatRequest) -> Result<Schedule, ScheduleError> {
    if request.times == Some(0) {
        return Err(ScheduleError::ZeroTimes);
    }

    let kind = match (&request.every, &request.cron) {
        (Some(interval_ms), None) => {
            if *interval_ms == 0 {
                return Err(ScheduleError::ZeroInterval);
            }
            ScheduleKind::Every {
                interval_ms: *interval_ms,
            }
        }
        (None, Some(cron)) => {
            let (expr, timezone) = match cron.split_once(';') {
                Some((expr, tz)) => (expr, Some(tz)),
                None => (cron.as_str(), request.cron_timezone.as_deref()),
            };
            let parsed = TimedCron::parse(expr, timezone)?;
            ScheduleKind::Cron {
                expr: parsed.expr().to_string(),
                timezone: parsed.timezone_name().to_string(),
            }
        }
        _ => return Err(ScheduleError::AmbiguousRepeat),
    };

    Ok(Schedule {
        kind,
        times: request.times,
    })
}
