//! # quirrel-scheduler
//!
//! Pure scheduling arithmetic: computing a job's first due time from
//! `{runAt | delay | repeat}` input, and the next due time after each
//! execution. Deterministic, no I/O — every function takes `now`
//! explicitly.

pub mod cron;
pub mod engine;
pub mod error;

pub use cron::TimedCron;
pub use engine::{compute_initial_run_at, compute_next_run_at, validate_repeat};
pub use error::ScheduleError;
