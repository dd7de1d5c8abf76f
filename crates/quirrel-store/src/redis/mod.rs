//! Redis store provider.

pub mod client;
pub mod scripts;
pub mod store;

pub use client::RedisStoreClient;
pub use store::RedisJobStore;
