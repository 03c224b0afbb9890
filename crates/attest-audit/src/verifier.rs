//! Read-only integrity verification over an `AuditStore`.

use std::sync::Arc;

use tracing::{info, warn};

use attest_contracts::{
    entry::AuditEntry,
    error::{AttestError, AttestResult, StoreError},
    report::VerificationReport,
};
use attest_core::traits::{AuditStore, CriticalityClassifier};
use attest_crypto::SigningSecret;

use crate::chain::{verify_entries, SignatureChecks};

/// Recomputes the chain from persisted entries and reports every
/// disagreement. Never writes, never repairs.
pub struct IntegrityVerifier {
    store: Arc<dyn AuditStore>,
    signatures: Option<SignatureChecks>,
}

impl IntegrityVerifier {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            signatures: None,
        }
    }

    /// Also audit signatures against `classifier`, and their validity when a
    /// secret is supplied. Signature findings make the report invalid.
    pub fn with_signature_checks(
        mut self,
        classifier: Arc<dyn CriticalityClassifier>,
        secret: Option<SigningSecret>,
    ) -> Self {
        self.signatures = Some(SignatureChecks { classifier, secret });
        self
    }

    /// Verify entries in `[start_sequence, end_sequence]`.
    ///
    /// # Errors
    ///
    /// - `InvalidRange` if `start_sequence` is 0 or after `end_sequence`.
    /// - `PersistenceUnavailable` if the store cannot be read.
    /// - `Store` for any other store failure, e.g. a corrupt row.
    pub fn verify(&self, start_sequence: u64, end_sequence: u64) -> AttestResult<VerificationReport> {
        if start_sequence == 0 || start_sequence > end_sequence {
            return Err(AttestError::InvalidRange {
                start: start_sequence,
                end: end_sequence,
            });
        }

        let entries = self
            .store
            .range(start_sequence, end_sequence)
            .map_err(read_error)?;

        Ok(self.report(start_sequence, end_sequence, &entries))
    }

    /// Verify the whole chain, from genesis to the latest entry.
    pub fn verify_all(&self) -> AttestResult<VerificationReport> {
        match self.store.latest().map_err(read_error)? {
            Some(latest) => self.verify(AuditEntry::GENESIS_SEQUENCE, latest.sequence),
            None => {
                info!("audit chain is empty; nothing to verify");
                Ok(VerificationReport::from_findings(AuditEntry::GENESIS_SEQUENCE, 0, 0, Vec::new()))
            }
        }
    }

    fn report(&self, start: u64, end: u64, entries: &[AuditEntry]) -> VerificationReport {
        let findings = verify_entries(entries, start, self.signatures.as_ref());
        let report = VerificationReport::from_findings(start, end, entries.len(), findings);

        if report.valid {
            info!(start, end, total_entries = report.total_entries, "audit chain verified");
        } else {
            for finding in report.origins() {
                warn!(
                    sequence = finding.sequence,
                    kind = %finding.kind,
                    expected = %finding.expected,
                    actual = %finding.actual,
                    "audit chain finding"
                );
            }
            warn!(
                start,
                end,
                findings = report.findings.len(),
                propagated = report.propagated().count(),
                first_broken_at = ?report.first_broken_at,
                "audit chain verification failed"
            );
        }
        report
    }
}

impl std::fmt::Debug for IntegrityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityVerifier")
            .field("signature_checks", &self.signatures.is_some())
            .finish()
    }
}

fn read_error(e: StoreError) -> AttestError {
    match e {
        StoreError::Unavailable { reason } => AttestError::PersistenceUnavailable { reason },
        other => AttestError::Store(other),
    }
}
