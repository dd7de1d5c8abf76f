//! Scheduling error types.

use thiserror::Error;

/// Errors produced while validating or evaluating a schedule.
///
/// All of these surface as synchronous validation failures at enqueue
/// time; evaluation of an already-stored schedule only fails if the
/// expression has no future occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The cron expression did not parse.
    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron {
        /// The offending expression.
        expr: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The timezone is not a known IANA name.
    #[error("Invalid timezone '{0}'")]
    InvalidTimezone(String),

    /// `repeat.times` was zero.
    #[error("repeat.times must be at least 1")]
    ZeroTimes,

    /// `repeat.every` was zero.
    #[error("repeat.every must be a positive number of milliseconds")]
    ZeroInterval,

    /// Exactly one of `every` / `cron` must be given.
    #[error("repeat must set exactly one of 'every' or 'cron'")]
    AmbiguousRepeat,

    /// The expression parses but never fires again.
    #[error("No future occurrence for cron expression '{0}'")]
    Unsatisfiable(String),
}
