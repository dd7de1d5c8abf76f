//! Store key builders.
//!
//! Centralising key construction prevents typos and makes it easy to
//! find every key the engine uses. All keys are built on top of the
//! configured prefix (default `quirrel:`); queue descriptors and job ids
//! arrive percent-encoded so `/` is a safe separator inside index
//! members.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

/// Encode one key component (job id) the same way queue descriptors are
/// encoded, so index members split unambiguously on `/`.
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string()
}

/// Hash of one queue's job records: field = encoded id, value = JSON.
pub fn job_hash(queue_encoded: &str) -> String {
    format!("job:{queue_encoded}")
}

/// The global due-time index (sorted set, score = due epoch millis).
pub fn due_index() -> String {
    "due".to_string()
}

/// The global in-flight set (sorted set, score = claim epoch millis).
pub fn inflight_index() -> String {
    "inflight".to_string()
}

/// Per-queue exclusivity lock key.
pub fn queue_lock(queue_encoded: &str) -> String {
    format!("lock:{queue_encoded}")
}

/// Credential → tenant mapping.
pub fn token(token: &str) -> String {
    format!("token:{token}")
}

/// Prefix of all tenant → credential reverse-mapping keys.
pub fn tenant_token_prefix() -> String {
    "tenant-token:".to_string()
}

/// Tenant → credential reverse mapping. Tenant ids are stored raw so
/// the revoke script can rebuild this key from the mapping value.
pub fn tenant_token(tenant: &str) -> String {
    format!("{}{tenant}", tenant_token_prefix())
}

/// Per-tenant dispatch counters (hash, field = tenant).
pub fn usage() -> String {
    "usage".to_string()
}

/// Set of endpoints a tenant has ever enqueued to.
pub fn endpoints(tenant: &str) -> String {
    format!("endpoints:{tenant}")
}

/// Sentinel marking the one-shot queue-directory backfill as done.
pub fn directory_sentinel() -> String {
    "migrations:queue-directory".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_encoding_escapes_separator() {
        assert!(!encode_component("a/b:c").contains('/'));
    }

    #[test]
    fn test_job_hash_key() {
        assert_eq!(job_hash("t1/endpoint"), "job:t1/endpoint");
    }
}
