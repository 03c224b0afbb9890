//! # attest-audit
//!
//! Append-only stores and the integrity verifier for the attest audit chain.
//!
//! ## Overview
//!
//! Every entry links to its predecessor through `previous_hash`. Changing a
//! single byte of a persisted entry makes its hash unreproducible and breaks
//! the recomputed chain from that point on. [`IntegrityVerifier`] reads a
//! range back from an [`AuditStore`](attest_core::traits::AuditStore) and
//! reports where.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use attest_audit::{IntegrityVerifier, JsonlAuditStore};
//!
//! let store = Arc::new(JsonlAuditStore::open("audit.jsonl")?);
//! let report = IntegrityVerifier::new(store).verify_all()?;
//!
//! if !report.valid {
//!     for finding in report.origins() {
//!         eprintln!("{} at {}", finding.kind, finding.sequence);
//!     }
//! }
//! ```

pub mod chain;
pub mod file;
pub mod memory;
pub mod verifier;

pub use chain::{verify_entries, SignatureChecks};
pub use file::JsonlAuditStore;
pub use memory::InMemoryAuditStore;
pub use verifier::IntegrityVerifier;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use attest_contracts::{
        entry::{ActionData, AuditEntry},
        error::{AttestError, StoreError},
        report::FindingKind,
    };
    use attest_core::{
        traits::{AuditStore, CriticalityClassifier, SecretProvider},
        AuditLogService, ChainTip, NoSecret, StaticSecret,
    };
    use attest_crypto::{recompute, SigningSecret};
    use attest_policy::ActionClassifier;

    use super::{InMemoryAuditStore, IntegrityVerifier, JsonlAuditStore};

    // ── Helpers ───────────────────────────────────────────────────────────────

    const SECRET: &[u8] = b"test-signing-secret";

    fn classifier() -> Arc<dyn CriticalityClassifier> {
        Arc::new(ActionClassifier::from_config(&Default::default()))
    }

    fn secret() -> Arc<dyn SecretProvider> {
        Arc::new(StaticSecret::new(SECRET))
    }

    /// A bootstrapped service writing into `store`.
    fn service(store: Arc<dyn AuditStore>, secrets: Arc<dyn SecretProvider>) -> AuditLogService {
        let service = AuditLogService::new(store, classifier(), secrets);
        service.bootstrap().unwrap();
        service
    }

    /// Append `n` updates of one gauge, each with a distinct payload.
    fn write_updates(service: &AuditLogService, n: u64) {
        for i in 0..n {
            let seq = service
                .record(
                    ActionData::new("update")
                        .actor("inspector-7")
                        .subject("gauge", "G-100")
                        .before(json!({ "reading": i }))
                        .after(json!({ "reading": i + 1, "unit": "mm" })),
                )
                .unwrap();
            assert!(seq.is_some(), "write {} must persist", i);
        }
    }

    // ── 1. tamper detection ───────────────────────────────────────────────────

    /// An untouched chain verifies clean.
    #[test]
    fn test_untampered_chain_is_valid() {
        let store = Arc::new(InMemoryAuditStore::new());
        write_updates(&service(store.clone(), secret()), 5);

        let report = IntegrityVerifier::new(store).verify(1, 5).unwrap();
        assert!(report.valid);
        assert_eq!(report.total_entries, 5);
        assert!(report.findings.is_empty());
        assert_eq!(report.first_broken_at, None);
    }

    /// Mutating entry 3's payload yields a hash mismatch at 3 and propagated
    /// chain breaks at 4 and 5.
    #[test]
    fn test_tampered_payload_is_localized() {
        let store = Arc::new(InMemoryAuditStore::new());
        write_updates(&service(store.clone(), secret()), 5);

        assert!(store.tamper(3, |e| e.after_state = Some(json!({ "reading": 999 }))));

        let report = IntegrityVerifier::new(store).verify(1, 5).unwrap();
        assert!(!report.valid, "tampered chain must not verify");
        assert_eq!(report.first_broken_at, Some(3));

        let mismatches: Vec<u64> = report
            .of_kind(FindingKind::HashMismatch)
            .map(|f| f.sequence)
            .collect();
        assert_eq!(mismatches, vec![3]);

        let breaks: Vec<u64> = report
            .of_kind(FindingKind::ChainBreak)
            .map(|f| f.sequence)
            .collect();
        assert_eq!(breaks, vec![4, 5]);
        assert!(
            report.of_kind(FindingKind::ChainBreak).all(|f| f.propagated),
            "breaks after the edited entry only propagate from it"
        );

        let origins: Vec<u64> = report.origins().map(|f| f.sequence).collect();
        assert_eq!(origins, vec![3], "only entry 3 should be blamed");
    }

    /// An attacker who also recomputes the edited entry's own hash hides the
    /// mismatch, but the link from entry 4 becomes the origin.
    #[test]
    fn test_rewritten_entry_breaks_next_link() {
        let store = Arc::new(InMemoryAuditStore::new());
        write_updates(&service(store.clone(), secret()), 5);

        store.tamper(3, |e| {
            e.after_state = Some(json!({ "reading": 999 }));
            e.current_hash = recompute(e).unwrap();
        });

        let report = IntegrityVerifier::new(store).verify(1, 5).unwrap();
        assert!(!report.valid);
        assert_eq!(report.of_kind(FindingKind::HashMismatch).count(), 0);
        assert_eq!(report.first_broken_at, Some(4));

        let origins: Vec<_> = report.origins().collect();
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0].sequence, 4);
        assert_eq!(origins[0].kind, FindingKind::ChainBreak);
    }

    /// Deleting an entry leaves a sequence gap.
    #[test]
    fn test_deleted_entry_is_a_gap() {
        let store = Arc::new(InMemoryAuditStore::new());
        write_updates(&service(store.clone(), secret()), 4);

        assert!(store.remove(2));

        let report = IntegrityVerifier::new(store).verify_all().unwrap();
        assert!(!report.valid);
        assert_eq!(report.total_entries, 3);
        let gaps: Vec<u64> = report
            .of_kind(FindingKind::SequenceGap)
            .map(|f| f.sequence)
            .collect();
        assert_eq!(gaps, vec![3]);
        assert_eq!(report.first_broken_at, Some(3));
    }

    /// A genesis entry must link to the sentinel, not to anything else.
    #[test]
    fn test_forged_genesis_link() {
        let store = Arc::new(InMemoryAuditStore::new());
        write_updates(&service(store.clone(), secret()), 2);

        store.tamper(1, |e| {
            e.previous_hash = "ab".repeat(32);
            e.current_hash = recompute(e).unwrap();
        });

        let report = IntegrityVerifier::new(store).verify(1, 2).unwrap();
        assert!(!report.valid);
        let origins: Vec<(u64, FindingKind)> = report.origins().map(|f| (f.sequence, f.kind)).collect();
        assert_eq!(origins, vec![(1, FindingKind::ChainBreak), (2, FindingKind::ChainBreak)]);
    }

    /// A range that does not start at genesis verifies on its own.
    #[test]
    fn test_partial_range() {
        let store = Arc::new(InMemoryAuditStore::new());
        write_updates(&service(store.clone(), secret()), 6);

        let report = IntegrityVerifier::new(store).verify(3, 5).unwrap();
        assert!(report.valid);
        assert_eq!(report.start_sequence, 3);
        assert_eq!(report.end_sequence, 5);
        assert_eq!(report.total_entries, 3);
    }

    // ── 2. signature audit ────────────────────────────────────────────────────

    #[test]
    fn test_signature_checks() {
        let store = Arc::new(InMemoryAuditStore::new());
        let service = service(store.clone(), secret());
        service.record(ActionData::new("login").actor("u1")).unwrap();
        service
            .record(ActionData::new("delete").actor("u1").subject("gauge", "G-1"))
            .unwrap();

        let checked = || {
            IntegrityVerifier::new(store.clone())
                .with_signature_checks(classifier(), Some(SigningSecret::new(SECRET)))
        };
        assert!(checked().verify_all().unwrap().valid);

        // Signatures are not chained, so forging one is invisible without the audit.
        store.tamper(2, |e| e.signature = Some("00".repeat(32)));
        assert!(IntegrityVerifier::new(store.clone()).verify_all().unwrap().valid);

        let report = checked().verify_all().unwrap();
        assert!(!report.valid);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, FindingKind::SignatureInvalid);
        assert_eq!(report.findings[0].sequence, 2);

        store.tamper(2, |e| e.signature = None);
        store.tamper(1, |e| e.signature = Some("11".repeat(32)));
        let kinds: Vec<(u64, FindingKind)> = checked()
            .verify_all()
            .unwrap()
            .findings
            .iter()
            .map(|f| (f.sequence, f.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![(1, FindingKind::UnexpectedSignature), (2, FindingKind::SignatureMissing)]
        );
    }

    // ── 3. degraded mode ──────────────────────────────────────────────────────

    /// A failed write returns `None` and the next write after recovery gets
    /// exactly `last_sequence + 1`.
    #[test]
    fn test_outage_does_not_advance_sequence() {
        let store = Arc::new(InMemoryAuditStore::new());
        let service = service(store.clone(), secret());
        write_updates(&service, 2);

        store.set_offline(true);
        assert_eq!(service.record(ActionData::new("login")).unwrap(), None);
        assert_eq!(service.record(ActionData::new("login")).unwrap(), None);

        store.set_offline(false);
        assert_eq!(service.record(ActionData::new("login")).unwrap(), Some(3));
        assert!(IntegrityVerifier::new(store).verify_all().unwrap().valid);
    }

    /// A service that starts while the store is down resumes once it is back.
    #[test]
    fn test_degraded_startup_recovers() {
        let store = Arc::new(InMemoryAuditStore::new());
        write_updates(&service(store.clone(), secret()), 3);

        store.set_offline(true);
        let restarted = AuditLogService::new(store.clone(), classifier(), secret())
            .with_rebootstrap_interval(Duration::ZERO);
        assert!(restarted.bootstrap().unwrap().is_degraded());
        assert_eq!(restarted.record(ActionData::new("login")).unwrap(), None);

        store.set_offline(false);
        assert_eq!(restarted.record(ActionData::new("login")).unwrap(), Some(4));
        assert!(restarted.tip().unwrap().is_ready());
    }

    /// The verifier has no degraded mode.
    #[test]
    fn test_verifier_surfaces_outage() {
        let store = Arc::new(InMemoryAuditStore::new());
        store.set_offline(true);

        let err = IntegrityVerifier::new(store).verify(1, 10).unwrap_err();
        assert!(matches!(err, AttestError::PersistenceUnavailable { .. }));
    }

    // ── 4. signing configuration ──────────────────────────────────────────────

    /// `delete` without a secret fails and persists nothing; `login` succeeds
    /// unsigned.
    #[test]
    fn test_critical_without_secret() {
        let store = Arc::new(InMemoryAuditStore::new());
        let service = service(store.clone(), Arc::new(NoSecret));

        let err = service.record(ActionData::new("delete")).unwrap_err();
        assert!(matches!(err, AttestError::SigningConfiguration { .. }));
        assert!(store.is_empty(), "nothing may be persisted");

        assert_eq!(service.record(ActionData::new("login")).unwrap(), Some(1));
        assert_eq!(store.snapshot()[0].signature, None);
    }

    // ── 5. bootstrap ──────────────────────────────────────────────────────────

    #[test]
    fn test_bootstrap_is_idempotent() {
        let store = Arc::new(InMemoryAuditStore::new());
        write_updates(&service(store.clone(), secret()), 3);

        let service = AuditLogService::new(store.clone(), classifier(), secret());
        let first = service.bootstrap().unwrap();
        let second = service.bootstrap().unwrap();
        assert_eq!(first, second);

        match first {
            ChainTip::Ready { last_sequence, last_hash } => {
                assert_eq!(last_sequence, 3);
                assert_eq!(last_hash, store.snapshot()[2].current_hash);
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    // ── 6. concurrency ────────────────────────────────────────────────────────

    /// N concurrent writers produce N contiguous sequences and one valid chain.
    #[test]
    fn test_concurrent_writers_form_one_chain() {
        let store = Arc::new(InMemoryAuditStore::new());
        let service = service(store.clone(), secret());

        std::thread::scope(|s| {
            for t in 0..8 {
                let service = &service;
                s.spawn(move || {
                    for i in 0..10 {
                        let action = if i % 5 == 0 { "delete" } else { "update" };
                        let data = ActionData::new(action)
                            .actor(format!("worker-{}", t))
                            .after(json!({ "i": i }));
                        assert!(service.record(data).unwrap().is_some());
                    }
                });
            }
        });

        let sequences: Vec<u64> = store.snapshot().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (1..=80).collect::<Vec<_>>());

        let report = IntegrityVerifier::new(store)
            .with_signature_checks(classifier(), Some(SigningSecret::new(SECRET)))
            .verify_all()
            .unwrap();
        assert!(report.valid, "findings: {:?}", report.findings);
    }

    // ── 7. stores ─────────────────────────────────────────────────────────────

    #[test]
    fn test_memory_store_rejects_stale_sequence() {
        let store = Arc::new(InMemoryAuditStore::new());
        write_updates(&service(store.clone(), secret()), 2);

        let stale = store.snapshot()[1].clone();
        assert!(matches!(
            store.insert(&stale),
            Err(StoreError::Conflict { sequence: 2 })
        ));
        assert_eq!(store.len(), 2);
    }

    /// Entries written to a JSON-lines file reload bit-identically, floats
    /// included, and a restarted service continues the chain.
    #[test]
    fn test_jsonl_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");

        {
            let store = Arc::new(JsonlAuditStore::open(&path).unwrap());
            let service = service(store, secret());
            service
                .record(
                    ActionData::new("calibrate")
                        .subject("gauge", "G-100")
                        .after(json!({ "offset": 0.1, "drift": -3.0e-7, "tags": ["a", "b"] })),
                )
                .unwrap();
            service.record(ActionData::new("delete").subject("gauge", "G-99")).unwrap();
        }

        let store = Arc::new(JsonlAuditStore::open(&path).unwrap());
        let service = service(store.clone(), secret());
        assert_eq!(service.record(ActionData::new("login")).unwrap(), Some(3));

        let entries = store.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[1].signature.is_some());

        let report = IntegrityVerifier::new(store)
            .with_signature_checks(classifier(), Some(SigningSecret::new(SECRET)))
            .verify_all()
            .unwrap();
        assert!(report.valid, "findings: {:?}", report.findings);
    }

    #[test]
    fn test_jsonl_store_rejects_stale_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlAuditStore::open(dir.path().join("audit.jsonl")).unwrap());
        write_updates(&service(store.clone(), secret()), 2);

        let first = store.read_all().unwrap()[0].clone();
        assert!(matches!(store.insert(&first), Err(StoreError::Conflict { .. })));
        assert_eq!(store.read_all().unwrap().len(), 2);
    }

    /// A line that is not an entry is reported, not skipped.
    #[test]
    fn test_jsonl_corrupt_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = Arc::new(JsonlAuditStore::open(&path).unwrap());
        write_updates(&service(store.clone(), secret()), 1);

        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{not json\n");
        std::fs::write(&path, contents).unwrap();

        match IntegrityVerifier::new(store).verify_all() {
            Err(AttestError::Store(StoreError::Corrupt { reason })) => {
                assert!(reason.contains("line 2"), "got: {reason}");
            }
            other => panic!("expected Corrupt, got {:?}", other),
        }

        // A complete bad line is never mistaken for a torn tail.
        let reopened = JsonlAuditStore::open(&path).unwrap();
        assert!(matches!(reopened.latest(), Err(StoreError::Corrupt { .. })));
    }

    /// A half-written final line left by a crash is dropped, and writing
    /// resumes on a clean line.
    #[test]
    fn test_jsonl_torn_tail_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let store = Arc::new(JsonlAuditStore::open(&path).unwrap());
            write_updates(&service(store, secret()), 1);
        }

        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str(r#"{"sequence":2,"act"#);
        std::fs::write(&path, contents).unwrap();

        let store = Arc::new(JsonlAuditStore::open(&path).unwrap());
        assert_eq!(store.read_all().unwrap().len(), 1);

        let service = AuditLogService::new(store.clone(), classifier(), secret())
            .with_rebootstrap_interval(Duration::ZERO);
        match service.bootstrap().unwrap() {
            ChainTip::Ready { last_sequence, .. } => assert_eq!(last_sequence, 1),
            other => panic!("expected Ready, got {:?}", other),
        }
        assert_eq!(service.record(ActionData::new("login")).unwrap(), Some(2));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));
        assert_eq!(raw.lines().count(), 2, "fragment must be gone: {raw}");

        let reopened = Arc::new(JsonlAuditStore::open(&path).unwrap());
        assert_eq!(reopened.read_all().unwrap().len(), 2);
        assert!(IntegrityVerifier::new(reopened).verify_all().unwrap().valid);
    }

    /// A complete last entry missing only its newline is kept, and the next
    /// append starts a new line.
    #[test]
    fn test_jsonl_missing_final_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let store = Arc::new(JsonlAuditStore::open(&path).unwrap());
            write_updates(&service(store, secret()), 2);
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, contents.trim_end()).unwrap();

        let store = Arc::new(JsonlAuditStore::open(&path).unwrap());
        assert_eq!(service(store.clone(), secret()).record(ActionData::new("login")).unwrap(), Some(3));

        let entries = store.read_all().unwrap();
        assert_eq!(entries.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(IntegrityVerifier::new(store).verify_all().unwrap().valid);
    }

    /// Appends check against the cached tail rather than re-reading the log.
    #[test]
    fn test_jsonl_tail_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = Arc::new(JsonlAuditStore::open(&path).unwrap());
        write_updates(&service(store.clone(), secret()), 2);

        std::fs::write(&path, "").unwrap();

        assert_eq!(store.latest().unwrap().map(|e| e.sequence), Some(2));
        assert!(JsonlAuditStore::open(&path).unwrap().latest().unwrap().is_none());
    }

    // ── 8. ranges ─────────────────────────────────────────────────────────────

    #[test]
    fn test_invalid_ranges() {
        let verifier = IntegrityVerifier::new(Arc::new(InMemoryAuditStore::new()));
        assert!(matches!(
            verifier.verify(0, 5),
            Err(AttestError::InvalidRange { start: 0, end: 5 })
        ));
        assert!(matches!(
            verifier.verify(6, 5),
            Err(AttestError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let report = IntegrityVerifier::new(Arc::new(InMemoryAuditStore::new()))
            .verify_all()
            .unwrap();
        assert!(report.valid);
        assert_eq!(report.total_entries, 0);
        assert_eq!(report.start_sequence, AuditEntry::GENESIS_SEQUENCE);
    }
}
