//! Payload signatures.
//!
//! Two modes, selected by configuration:
//!
//! - **HMAC** (default): `sha256=<hex>` over the raw payload, keyed
//!   with the tenant's own token (or the configured fallback secret).
//!   Receivers verify with the same token.
//! - **Asymmetric**: a compact JWS (EdDSA) over the payload's SHA-256
//!   digest, signed with a configured private key and verified by
//!   receivers with the matching public key.
//!
//! The payload itself may be ciphertext — end-to-end encryption is
//! applied by the enqueuing client and undone by the receiving handler;
//! signing covers whatever bytes travel.

use std::fmt;

use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use sha2::{Digest, Sha256};

use quirrel_core::config::signing::SigningConfig;
use quirrel_core::error::AppError;
use quirrel_core::result::AppResult;

type HmacSha256 = Hmac<Sha256>;

/// Claims of the asymmetric signature JWS.
#[derive(Debug, Serialize)]
struct SignatureClaims {
    /// Hex SHA-256 of the raw payload.
    digest: String,
    /// Issued-at, seconds since epoch.
    iat: i64,
}

/// Signs dispatch payloads.
pub enum PayloadSigner {
    /// HMAC-SHA256 with the tenant token as secret.
    Hmac {
        /// Secret used when a tenant has no token on record.
        fallback_secret: String,
    },
    /// EdDSA JWS with a configured private key.
    Asymmetric {
        /// The private signing key.
        key: EncodingKey,
    },
}

impl fmt::Debug for PayloadSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hmac { .. } => f.write_str("PayloadSigner::Hmac"),
            Self::Asymmetric { .. } => f.write_str("PayloadSigner::Asymmetric"),
        }
    }
}

impl PayloadSigner {
    /// Build the signer selected by the configuration.
    pub fn from_config(config: &SigningConfig) -> AppResult<Self> {
        match &config.private_key_pem {
            Some(pem) => {
                let key = EncodingKey::from_ed_pem(pem.as_bytes()).map_err(|e| {
                    AppError::configuration(format!("Invalid signing private key: {e}"))
                })?;
                Ok(Self::Asymmetric { key })
            }
            None => Ok(Self::Hmac {
                fallback_secret: config.fallback_secret.clone(),
            }),
        }
    }

    /// Whether a per-tenant secret is needed for signing.
    pub fn wants_tenant_secret(&self) -> bool {
        matches!(self, Self::Hmac { .. })
    }

    /// Produce the `x-quirrel-signature` header value for a payload.
    pub fn sign(&self, tenant_secret: Option<&str>, payload: &str) -> AppResult<String> {
        match self {
            Self::Hmac { fallback_secret } => {
                let secret = tenant_secret.unwrap_or(fallback_secret);
                Ok(hmac_signature(secret, payload.as_bytes())?)
            }
            Self::Asymmetric { key } => {
                let claims = SignatureClaims {
                    digest: hex::encode(Sha256::digest(payload.as_bytes())),
                    iat: chrono::Utc::now().timestamp(),
                };
                encode(&Header::new(Algorithm::EdDSA), &claims, key)
                    .map_err(|e| AppError::internal(format!("Payload signing failed: {e}")))
            }
        }
    }
}

/// GitHub-style HMAC-SHA256 signature: `sha256=<hex>`.
pub fn hmac_signature(secret: &str, payload: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal(format!("HMAC key setup failed: {e}")))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Constant-time verification of a `sha256=<hex>` signature, for
/// receiving handlers and tests.
pub fn verify_hmac(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
