//! Payload signing configuration.

use serde::{Deserialize, Serialize};

/// Payload signing configuration.
///
/// By default every dispatch is signed with HMAC-SHA256 using the
/// tenant's own token as the symmetric secret. When `private_key_pem`
/// is set the worker switches to asymmetric signing and receivers
/// verify with the matching public key instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// PEM-encoded Ed25519 private key for asymmetric signing.
    #[serde(default)]
    pub private_key_pem: Option<String>,
    /// Symmetric secret used when a tenant has no token on record.
    #[serde(default = "default_fallback_secret")]
    pub fallback_secret: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            private_key_pem: None,
            fallback_secret: default_fallback_secret(),
        }
    }
}

fn default_fallback_secret() -> String {
    "quirrel".to_string()
}
