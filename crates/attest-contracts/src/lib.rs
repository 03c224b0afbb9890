//! # attest-contracts
//!
//! Shared types for the attest audit chain: the persisted `AuditEntry`, the
//! caller-facing `ActionData`, the verifier's `VerificationReport`, and the
//! error taxonomy.
//!
//! No business logic lives in this crate, only data definitions and error
//! types.

pub mod entry;
pub mod error;
pub mod report;

pub use entry::{to_payload, ActionData, AuditEntry, RequestContext};
pub use error::{AttestError, AttestResult, StoreError};
pub use report::{Finding, FindingKind, VerificationReport};
