//! # quirrel-core
//!
//! Core crate for the Quirrel scheduling engine. Contains configuration
//! schemas, typed identifiers, the queue descriptor, activity events,
//! scan/pagination types, the telemetry reporter seam, and the unified
//! error system.
//!
//! This crate has **no** internal dependencies on other Quirrel crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
