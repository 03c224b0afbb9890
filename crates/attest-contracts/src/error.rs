//! Error types for the attest audit chain.
//!
//! All fallible operations return `AttestResult<T>`. Chain breaks and hash
//! mismatches are not errors: they are findings inside a
//! `VerificationReport`.

use thiserror::Error;

/// Failures reported by an `AuditStore` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or the write/read did not complete.
    #[error("audit store unavailable: {reason}")]
    Unavailable { reason: String },

    /// An entry with this sequence (or a later one) already exists.
    ///
    /// Usually means another writer advanced the chain behind our back.
    #[error("audit store already holds sequence {sequence} or later")]
    Conflict { sequence: u64 },

    /// A persisted row could not be decoded back into an `AuditEntry`.
    #[error("audit store returned a corrupt row: {reason}")]
    Corrupt { reason: String },
}

/// The unified error type for the attest crates.
#[derive(Debug, Error)]
pub enum AttestError {
    /// The caller's `ActionData` failed validation (e.g. blank `action`).
    #[error("invalid audit action: {reason}")]
    InvalidAction { reason: String },

    /// A field could not be canonically encoded for hashing or signing.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// A critical action needs a signature but no signing secret is configured.
    #[error("signing configuration error: {reason}")]
    SigningConfiguration { reason: String },

    /// The persistence layer is unreachable.
    ///
    /// `AuditLogService::record` swallows this and returns `None`; the
    /// verifier and tooling surface it.
    #[error("persistence unavailable: {reason}")]
    PersistenceUnavailable { reason: String },

    /// `record` was called before `bootstrap`.
    #[error("audit chain has not been bootstrapped")]
    NotBootstrapped,

    /// A verification range with `start > end` or a zero start.
    #[error("invalid sequence range {start}..={end}")]
    InvalidRange { start: u64, end: u64 },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// An internal lock was poisoned by a panicking writer.
    #[error("audit chain state poisoned: {reason}")]
    StatePoisoned { reason: String },

    /// A store failure that is not simple unavailability.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AttestError {
    /// True for failures that `record` degrades to `None` instead of raising.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            AttestError::PersistenceUnavailable { .. } | AttestError::Store(_)
        )
    }
}

/// Convenience alias used throughout the attest crates.
pub type AttestResult<T> = Result<T, AttestError>;
