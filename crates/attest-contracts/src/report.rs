//! Integrity verification report types.
//!
//! The verifier never raises on tampering: it collects `Finding`s into a
//! `VerificationReport` for an operator to investigate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of inconsistency a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// `previous_hash` does not match the recomputed hash of the preceding entry.
    ChainBreak,
    /// The stored `current_hash` does not match the entry's own fields.
    HashMismatch,
    /// Consecutive entries in the range are not contiguous.
    SequenceGap,
    /// A critical action was persisted without a signature.
    SignatureMissing,
    /// A non-critical action carries a signature.
    UnexpectedSignature,
    /// The signature does not verify under the configured secret.
    SignatureInvalid,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::ChainBreak => "chain_break",
            FindingKind::HashMismatch => "hash_mismatch",
            FindingKind::SequenceGap => "sequence_gap",
            FindingKind::SignatureMissing => "signature_missing",
            FindingKind::UnexpectedSignature => "unexpected_signature",
            FindingKind::SignatureInvalid => "signature_invalid",
        }
    }
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single inconsistency found at one sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub sequence: u64,
    pub kind: FindingKind,
    /// The value recomputation says should be there.
    pub expected: String,
    /// The value actually stored.
    pub actual: String,
    /// True when this chain break only follows from an earlier finding: the
    /// stored link still matches the stored predecessor, but the predecessor
    /// no longer reproduces it. Always false for non-chain findings.
    pub propagated: bool,
}

/// The outcome of verifying a contiguous range of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True iff `findings` is empty.
    pub valid: bool,
    pub start_sequence: u64,
    pub end_sequence: u64,
    /// Number of entries read from the store for this range.
    pub total_entries: usize,
    /// Findings ordered by sequence.
    pub findings: Vec<Finding>,
    /// The earliest sequence with any finding.
    pub first_broken_at: Option<u64>,
    pub verified_at: DateTime<Utc>,
}

impl VerificationReport {
    /// Build a report, deriving `valid` and `first_broken_at` from `findings`.
    pub fn from_findings(
        start_sequence: u64,
        end_sequence: u64,
        total_entries: usize,
        mut findings: Vec<Finding>,
    ) -> Self {
        findings.sort_by_key(|f| f.sequence);
        let first_broken_at = findings.first().map(|f| f.sequence);
        Self {
            valid: findings.is_empty(),
            start_sequence,
            end_sequence,
            total_entries,
            findings,
            first_broken_at,
            verified_at: Utc::now(),
        }
    }

    /// Findings of one kind, in sequence order.
    pub fn of_kind(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    /// Findings that point at where tampering happened, excluding breaks that
    /// merely propagate from an earlier one.
    pub fn origins(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.propagated)
    }

    /// Chain breaks that follow from an earlier finding.
    pub fn propagated(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.propagated)
    }
}
