//! End-to-end tests: producer + delivery worker against the in-memory
//! store, with local HTTP listeners standing in for remote job
//! endpoints and the incident receiver.

mod helpers;

mod activity_test;
mod producer_test;
mod worker_test;
