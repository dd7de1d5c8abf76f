//! Tenant token record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quirrel_core::types::TenantId;

/// Maps an opaque bearer credential to a tenant.
///
/// Created and revoked by the admin surface; consumed by the producer
/// (scoping) and by the delivery worker (default HMAC signing secret).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The opaque credential string.
    pub token: String,
    /// The tenant the credential resolves to.
    pub tenant: TenantId,
    /// When the credential was issued.
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Create a record stamped with the current time.
    pub fn new(token: impl Into<String>, tenant: impl Into<TenantId>) -> Self {
        Self {
            token: token.into(),
            tenant: tenant.into(),
            created_at: Utc::now(),
        }
    }
}
