//! Queue descriptors.
//!
//! A queue is identified by the pair `(tenant, endpoint URL)`. The pair is
//! percent-encoded and joined with `/` so the encoded form is safe to use
//! inside store keys and index members, and round-trips losslessly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::id::TenantId;

/// Composite descriptor of a logical queue: `(tenant, endpoint URL)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueDescriptor {
    /// The tenant owning the queue.
    pub tenant: TenantId,
    /// The HTTP destination the queue's jobs are delivered to.
    pub endpoint: String,
}

impl QueueDescriptor {
    /// Create a descriptor from a tenant and an endpoint URL.
    pub fn new(tenant: impl Into<TenantId>, endpoint: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Encoded form: `enc(tenant)/enc(endpoint)`.
    pub fn encode(&self) -> String {
        format!(
            "{}/{}",
            percent_encode(self.tenant.as_str()),
            percent_encode(&self.endpoint)
        )
    }

    /// Parse an encoded descriptor back into its parts.
    pub fn decode(encoded: &str) -> AppResult<Self> {
        let mut parts = encoded.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(tenant), Some(endpoint), None) => Ok(Self {
                tenant: TenantId::new(percent_decode(tenant)?),
                endpoint: percent_decode(endpoint)?,
            }),
            _ => Err(AppError::internal(format!(
                "Malformed queue descriptor: '{encoded}'"
            ))),
        }
    }

    /// Encoded index member for one job of this queue:
    /// `enc(tenant)/enc(endpoint)/enc(id)`.
    pub fn job_member(&self, id: &str) -> String {
        format!("{}/{}", self.encode(), percent_encode(id))
    }

    /// Split an index member back into `(descriptor, job id)`.
    pub fn decode_member(member: &str) -> AppResult<(Self, String)> {
        let mut parts = member.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(tenant), Some(endpoint), Some(id), None) => Ok((
                Self {
                    tenant: TenantId::new(percent_decode(tenant)?),
                    endpoint: percent_decode(endpoint)?,
                },
                percent_decode(id)?,
            )),
            _ => Err(AppError::internal(format!(
                "Malformed job member: '{member}'"
            ))),
        }
    }
}

impl fmt::Display for QueueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant, self.endpoint)
    }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

fn percent_decode(s: &str) -> AppResult<String> {
    percent_encoding::percent_decode_str(s)
        .decode_utf8()
        .map(|c| c.into_owned())
        .map_err(|e| AppError::internal(format!("Invalid percent-encoding in '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_roundtrip() {
        let desc = QueueDescriptor::new("acme corp", "https://example.com/api/queues?x=1");
        let encoded = desc.encode();
        assert!(!encoded.contains("https://"));
        let decoded = QueueDescriptor::decode(&encoded).unwrap();
        assert_eq!(decoded, desc);
    }

    #[test]
    fn test_member_roundtrip() {
        let desc = QueueDescriptor::new("t1", "https://example.com/hook");
        let member = desc.job_member("job/with/slashes");
        let (decoded, id) = QueueDescriptor::decode_member(&member).unwrap();
        assert_eq!(decoded, desc);
        assert_eq!(id, "job/with/slashes");
    }

    #[test]
    fn test_malformed_member_rejected() {
        assert!(QueueDescriptor::decode_member("onlyonepart").is_err());
    }
}
