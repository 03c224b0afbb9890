//! Collaborator traits consumed by the audit log service.
//!
//! These four traits are the boundary between the chain core and its host:
//!
//! - `AuditStore`             — durable append-only persistence
//! - `SecretProvider`         — signing key for critical actions
//! - `CriticalityClassifier`  — which actions need a signature
//! - `Clock`                  — where timestamps come from
//!
//! The service never updates or deletes through `AuditStore`; there is no
//! method for it.

use chrono::{DateTime, Utc};

use attest_contracts::{entry::AuditEntry, error::StoreError};
use attest_crypto::SigningSecret;

/// Durable, append-only storage for audit entries.
///
/// Implementations must reject an insert whose sequence is not greater than
/// the highest stored sequence with `StoreError::Conflict`, the way a unique
/// index would.
pub trait AuditStore: Send + Sync {
    /// Persist one entry. Returns only after the write is durable.
    fn insert(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// The entry with the highest sequence, or `None` for an empty store.
    fn latest(&self) -> Result<Option<AuditEntry>, StoreError>;

    /// Entries with `start <= sequence <= end`, ascending by sequence.
    fn range(&self, start: u64, end: u64) -> Result<Vec<AuditEntry>, StoreError>;
}

/// Supplies the key used to sign critical entries.
///
/// Absence must be reported as `None` so the signer can fail fast.
pub trait SecretProvider: Send + Sync {
    fn signing_secret(&self) -> Option<SigningSecret>;
}

/// Decides whether an action requires a non-repudiation signature.
///
/// Implementations must be pure lookups: the same action always gets the
/// same answer for the lifetime of the service.
pub trait CriticalityClassifier: Send + Sync {
    fn is_critical(&self, action: &str) -> bool;
}

/// Source of entry timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
