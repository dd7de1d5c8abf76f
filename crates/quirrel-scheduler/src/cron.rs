//! Timezone-embedded cron expressions.
//!
//! A cron expression and an IANA timezone travel together, serialized as
//! `"<expr>;<tz>"` and parsed back symmetrically. The timezone defaults
//! to UTC when no suffix is present. Invalid expressions and unknown
//! timezones are rejected here, at validation time — evaluation of a
//! stored schedule can only fail if the expression never fires again.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;

use crate::error::ScheduleError;

/// A parsed cron expression bound to the timezone it is evaluated in.
#[derive(Debug, Clone)]
pub struct TimedCron {
    cron: Cron,
    timezone: Tz,
    expr: String,
}

impl TimedCron {
    /// Parse an expression and an optional IANA timezone (default UTC).
    ///
    /// Expressions may carry five fields (minute resolution) or six
    /// (leading seconds field); day-of-month supports `L` for the last
    /// day of the month.
    pub fn parse(expr: &str, timezone: Option<&str>) -> Result<Self, ScheduleError> {
        let tz_name = timezone.unwrap_or("UTC");
        let timezone: Tz = tz_name
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone(tz_name.to_string()))?;

        let cron = Cron::new(expr)
            .with_seconds_optional()
            .parse()
            .map_err(|e| ScheduleError::InvalidCron {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            cron,
            timezone,
            expr: expr.to_string(),
        })
    }

    /// Parse the embedded `"<expr>;<tz>"` form.
    pub fn parse_embedded(serialized: &str) -> Result<Self, ScheduleError> {
        match serialized.split_once(';') {
            Some((expr, tz)) => Self::parse(expr, Some(tz)),
            None => Self::parse(serialized, None),
        }
    }

    /// Serialize back to the embedded `"<expr>;<tz>"` form.
    pub fn embed(&self) -> String {
        format!("{};{}", self.expr, self.timezone.name())
    }

    /// The bare expression.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// The IANA name of the evaluation timezone.
    pub fn timezone_name(&self) -> &str {
        self.timezone.name()
    }

    /// The next occurrence strictly after `after`, evaluated in the
    /// embedded timezone and returned in UTC.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let local = after.with_timezone(&self.timezone);
        self.cron
            .find_next_occurrence(&local, false)
            .map(|next| next.with_timezone(&Utc))
            .map_err(|_| ScheduleError::Unsatisfiable(self.expr.clone()))
    }
}
