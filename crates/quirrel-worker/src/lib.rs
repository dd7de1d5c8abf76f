//! # quirrel-worker
//!
//! The delivery pipeline. A polling loop claims due jobs from the
//! backing store, dispatches signed HTTP callbacks with bounded
//! concurrency, and interprets each response: reschedule the next
//! repetition, consume a retry interval, or retire the job and forward
//! an incident report.
//!
//! The only cross-job mutual exclusion in the system is the per-queue
//! exclusivity lock taken here during claim processing.

pub mod dispatch;
pub mod incident;
pub mod runner;
pub mod signing;
pub mod ssrf;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use incident::IncidentReporter;
pub use runner::DeliveryWorker;
pub use signing::PayloadSigner;
