//! HMAC-SHA256 signatures over the non-repudiation subset of an entry.
//!
//! The signature covers who did what to which subject and when:
//! `{actor_id, action, subject_type, subject_id, timestamp}`. Content
//! integrity is the chain hash's job, so payloads are not signed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use attest_contracts::{
    entry::AuditEntry,
    error::{AttestError, AttestResult},
};

use crate::canonical::CanonicalEncoder;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_DOMAIN: &str = "attest/signature/v1";

/// Key material for signing critical entries.
///
/// `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningSecret(<{} bytes redacted>)", self.0.len())
    }
}

/// The signed subset of an entry.
#[derive(Debug, Clone, Copy)]
pub struct SignedFields<'a> {
    pub actor_id: Option<&'a str>,
    pub action: &'a str,
    pub subject_type: Option<&'a str>,
    pub subject_id: Option<&'a str>,
    pub timestamp: &'a DateTime<Utc>,
}

impl<'a> SignedFields<'a> {
    pub fn of(entry: &'a AuditEntry) -> Self {
        Self {
            actor_id: entry.actor_id.as_deref(),
            action: &entry.action,
            subject_type: entry.subject_type.as_deref(),
            subject_id: entry.subject_id.as_deref(),
            timestamp: &entry.timestamp,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut enc = CanonicalEncoder::new(SIGNATURE_DOMAIN);
        enc.opt_str(self.actor_id)
            .str(self.action)
            .opt_str(self.subject_type)
            .opt_str(self.subject_id)
            .timestamp(self.timestamp);
        enc.finish()
    }
}

/// Sign `fields` with `secret`.
///
/// Fails with `AttestError::SigningConfiguration` when the secret is absent
/// or empty. Callers must treat that as fatal for critical actions.
pub fn sign(fields: &SignedFields<'_>, secret: Option<&SigningSecret>) -> AttestResult<String> {
    let mut mac = keyed_mac(secret)?;
    mac.update(&fields.encode());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a stored entry's signature in constant time.
///
/// Returns `Ok(false)` for a missing, malformed or wrong signature.
pub fn verify_signature(entry: &AuditEntry, secret: Option<&SigningSecret>) -> AttestResult<bool> {
    let Some(signature) = entry.signature.as_deref() else {
        return Ok(false);
    };
    let Ok(tag) = hex::decode(signature) else {
        return Ok(false);
    };

    let mut mac = keyed_mac(secret)?;
    mac.update(&SignedFields::of(entry).encode());
    Ok(mac.verify_slice(&tag).is_ok())
}

fn keyed_mac(secret: Option<&SigningSecret>) -> AttestResult<HmacSha256> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AttestError::SigningConfiguration {
            reason: "no signing secret configured for critical action".to_string(),
        })?;

    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| AttestError::SigningConfiguration {
        reason: format!("signing key rejected: {}", e),
    })
}
