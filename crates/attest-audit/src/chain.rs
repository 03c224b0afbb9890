//! Chain recomputation over a slice of persisted entries.
//!
//! Two independent checks run on every entry:
//!
//! 1. **Hash correctness** — `recompute(entry)` over the entry's own fields
//!    and stored `previous_hash` must equal the stored `current_hash`.
//!    A mismatch is a `hash_mismatch`.
//! 2. **Linkage** — `previous_hash` must equal the *recomputed* chain value
//!    of the preceding entry. A mismatch is a `chain_break`.
//!
//! The chain value is carried forward from recomputation, never from stored
//! hashes, so a single edited payload shows up as one `hash_mismatch` at the
//! edited entry followed by a `chain_break` on every later entry. Breaks
//! whose stored link still equals the predecessor's stored hash are marked
//! `propagated`: they follow from an earlier finding rather than pointing at
//! a new one.

use std::sync::Arc;

use attest_contracts::{
    entry::AuditEntry,
    error::AttestResult,
    report::{Finding, FindingKind},
};
use attest_core::traits::CriticalityClassifier;
use attest_crypto::{compute_hash, recompute, verify_signature, EntryFields, SigningSecret};

/// Placeholder chain value for an entry whose fields cannot be encoded.
const UNENCODABLE: &str = "<unencodable>";

/// Optional signature audit applied alongside chain verification.
///
/// The classifier should be the one that was in effect when the entries were
/// written; the presence law is judged against it.
#[derive(Clone)]
pub struct SignatureChecks {
    pub classifier: Arc<dyn CriticalityClassifier>,
    /// When set, every present signature is also checked for validity.
    pub secret: Option<SigningSecret>,
}

/// Verify a contiguous slice of entries, which should start at
/// `expected_start`.
///
/// Returns findings in sequence order. An empty slice has no findings.
pub fn verify_entries(
    entries: &[AuditEntry],
    expected_start: u64,
    signatures: Option<&SignatureChecks>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    // (predecessor, its recomputed chain value)
    let mut prev: Option<(&AuditEntry, String)> = None;

    for entry in entries {
        let own = recompute(entry);

        let chain_value = match &prev {
            None => {
                if entry.sequence != expected_start {
                    findings.push(finding(
                        entry.sequence,
                        FindingKind::SequenceGap,
                        expected_start.to_string(),
                        entry.sequence.to_string(),
                    ));
                }
                if entry.is_genesis() && entry.previous_hash != AuditEntry::GENESIS_HASH {
                    findings.push(finding(
                        entry.sequence,
                        FindingKind::ChainBreak,
                        AuditEntry::GENESIS_HASH.to_string(),
                        entry.previous_hash.clone(),
                    ));
                }
                own_chain_value(&own)
            }
            Some((p, expected_prev)) => {
                if entry.sequence != p.sequence + 1 {
                    findings.push(finding(
                        entry.sequence,
                        FindingKind::SequenceGap,
                        (p.sequence + 1).to_string(),
                        entry.sequence.to_string(),
                    ));
                }

                if entry.previous_hash == *expected_prev {
                    own_chain_value(&own)
                } else {
                    findings.push(Finding {
                        sequence: entry.sequence,
                        kind: FindingKind::ChainBreak,
                        expected: expected_prev.clone(),
                        actual: entry.previous_hash.clone(),
                        propagated: entry.previous_hash == p.current_hash,
                    });
                    // Continue the recomputed chain, not the stored one.
                    compute_hash(&EntryFields::of(entry), expected_prev)
                        .unwrap_or_else(|_| UNENCODABLE.to_string())
                }
            }
        };

        match &own {
            Ok(hash) if *hash != entry.current_hash => findings.push(finding(
                entry.sequence,
                FindingKind::HashMismatch,
                hash.clone(),
                entry.current_hash.clone(),
            )),
            Err(e) => findings.push(finding(
                entry.sequence,
                FindingKind::HashMismatch,
                format!("{} ({})", UNENCODABLE, e),
                entry.current_hash.clone(),
            )),
            Ok(_) => {}
        }

        if let Some(checks) = signatures {
            check_signature(entry, checks, &mut findings);
        }

        prev = Some((entry, chain_value));
    }

    findings
}

fn own_chain_value(own: &AttestResult<String>) -> String {
    match own {
        Ok(hash) => hash.clone(),
        Err(_) => UNENCODABLE.to_string(),
    }
}

fn check_signature(entry: &AuditEntry, checks: &SignatureChecks, findings: &mut Vec<Finding>) {
    let critical = checks.classifier.is_critical(&entry.action);

    match (critical, entry.signature.as_deref()) {
        (true, None) => findings.push(finding(
            entry.sequence,
            FindingKind::SignatureMissing,
            "signature".to_string(),
            "none".to_string(),
        )),
        (false, Some(sig)) => findings.push(finding(
            entry.sequence,
            FindingKind::UnexpectedSignature,
            "none".to_string(),
            sig.to_string(),
        )),
        (true, Some(sig)) => {
            if let Some(secret) = &checks.secret {
                if !verify_signature(entry, Some(secret)).unwrap_or(false) {
                    findings.push(finding(
                        entry.sequence,
                        FindingKind::SignatureInvalid,
                        "valid hmac-sha256".to_string(),
                        sig.to_string(),
                    ));
                }
            }
        }
        (false, None) => {}
    }
}

fn finding(sequence: u64, kind: FindingKind, expected: String, actual: String) -> Finding {
    Finding {
        sequence,
        kind,
        expected,
        actual,
        propagated: false,
    }
}
