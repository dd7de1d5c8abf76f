//! # quirrel-store
//!
//! Backing store providers for the scheduling engine. All durable state
//! — job hashes, the due-time index, the in-flight set, per-queue
//! exclusivity locks, token maps, usage counters, and the queue
//! directory — lives behind the [`JobStore`] trait so storage engines
//! are swappable.
//!
//! Two providers ship: Redis (every multi-key mutation is a Lua script
//! or compare-and-swap loop, one round trip, safe under concurrent
//! workers) and an in-memory store with the same semantics for tests
//! and single-process deployments.

pub mod keys;
pub mod provider;
pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::StoreManager;
pub use traits::{JobStore, PutOutcome};
