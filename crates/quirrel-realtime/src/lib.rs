//! # quirrel-realtime
//!
//! Best-effort activity fan-out. Every producer/worker lifecycle
//! transition is published on a per-tenant channel; subscribers (the
//! developer UI, API consumers) receive an ordered, at-most-once stream
//! with no replay. This stream is observability, not a source of truth
//! — losing a subscriber loses no job state.

pub mod publisher;

pub use publisher::ActivityPublisher;
