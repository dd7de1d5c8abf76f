//! # quirrel-entity
//!
//! Domain models and wire DTOs: the [`job::model::Job`] record stored in
//! the backing store, the [`job::dto`] shapes exchanged with API
//! callers, tenant tokens, and incident reports.

pub mod incident;
pub mod job;
pub mod token;

pub use incident::{IncidentDetail, IncidentReport};
pub use job::dto::{EnqueueRequest, JobDto, RepeatDto, RepeatRequest};
pub use job::model::{Job, Schedule, ScheduleKind};
pub use token::TokenRecord;
