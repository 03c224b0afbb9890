//! The audit log service: the only component callers talk to.
//!
//! Every `record` call runs the append pipeline:
//!
//!   validate → reserve → hash → [classify → sign] → persist → commit
//!
//! Hashing and signing failures abort before anything is persisted and the
//! reservation rolls back. Persistence failures are logged and turned into
//! `Ok(None)`: an audit outage must never break the operation being audited.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use attest_contracts::{
    entry::{ActionData, AuditEntry},
    error::{AttestResult, StoreError},
};
use attest_crypto::{canonical_timestamp, compute_hash, sign, EntryFields, SignedFields};

use crate::{
    events::{self, Severity},
    sequencer::{ChainSequencer, ChainTip},
    traits::{AuditStore, Clock, CriticalityClassifier, SecretProvider, SystemClock},
};

/// Produces and persists chained, conditionally signed audit entries.
///
/// Construct one per store and share it (`Arc<AuditLogService>`) across
/// request handlers. Call `bootstrap()` once before the first `record()`.
pub struct AuditLogService {
    store: Arc<dyn AuditStore>,
    classifier: Arc<dyn CriticalityClassifier>,
    secrets: Arc<dyn SecretProvider>,
    clock: Arc<dyn Clock>,
    sequencer: ChainSequencer,
}

impl AuditLogService {
    pub fn new(
        store: Arc<dyn AuditStore>,
        classifier: Arc<dyn CriticalityClassifier>,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            store,
            classifier,
            secrets,
            clock: Arc::new(SystemClock),
            sequencer: ChainSequencer::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Minimum delay between re-bootstrap attempts while degraded.
    pub fn with_rebootstrap_interval(mut self, interval: Duration) -> Self {
        self.sequencer = self.sequencer.with_rebootstrap_interval(interval);
        self
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Load the chain tip from the store. Idempotent.
    ///
    /// Never fails because the store is down: the returned tip is
    /// `ChainTip::Degraded` and `record` skips writes until the store is
    /// reachable again.
    pub fn bootstrap(&self) -> AttestResult<ChainTip> {
        self.sequencer.bootstrap(self.store.as_ref())
    }

    pub fn tip(&self) -> AttestResult<ChainTip> {
        self.sequencer.tip()
    }

    /// Append one entry and return its sequence.
    ///
    /// Returns `Ok(None)` when the store is unavailable; the failure is
    /// logged and the chain tip is left untouched.
    ///
    /// # Errors
    ///
    /// - `InvalidAction` if `action` is blank
    /// - `NotBootstrapped` before `bootstrap()`
    /// - `Serialization` if a payload cannot be canonically encoded
    /// - `SigningConfiguration` for a critical action with no secret
    pub fn record(&self, data: ActionData) -> AttestResult<Option<u64>> {
        Ok(self.append(data)?.map(|entry| entry.sequence))
    }

    /// Like `record`, but returns the persisted entry.
    pub fn append(&self, data: ActionData) -> AttestResult<Option<AuditEntry>> {
        data.validate()?;
        let data = normalize(data);

        let reservation = match self.sequencer.reserve(self.store.as_ref()) {
            Ok(r) => r,
            Err(e) if e.is_persistence_failure() => {
                warn!(action = %data.action, reason = %e, "audit store unavailable, entry skipped");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let sequence = reservation.sequence();
        // Read under the reservation so timestamps follow sequence order.
        let timestamp = canonical_timestamp(self.clock.now());

        let fields = EntryFields::candidate(sequence, &data, &timestamp);
        let current_hash = compute_hash(&fields, reservation.previous_hash())?;

        let signature = if self.classifier.is_critical(&data.action) {
            let secret = self.secrets.signing_secret();
            let signed = SignedFields {
                actor_id: data.actor_id.as_deref(),
                action: &data.action,
                subject_type: data.subject_type.as_deref(),
                subject_id: data.subject_id.as_deref(),
                timestamp: &timestamp,
            };
            match sign(&signed, secret.as_ref()) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    warn!(action = %data.action, reason = %e, "critical action rejected");
                    return Err(e);
                }
            }
        } else {
            None
        };

        let entry = AuditEntry {
            sequence,
            actor_id: data.actor_id,
            action: data.action,
            subject_type: data.subject_type,
            subject_id: data.subject_id,
            before_state: data.before_state,
            after_state: data.after_state,
            source_ip: data.source_ip,
            user_agent: data.user_agent,
            timestamp,
            previous_hash: reservation.previous_hash().to_string(),
            current_hash,
            signature,
        };

        debug!(sequence, hash = %entry.current_hash, "persisting audit entry");

        match self.store.insert(&entry) {
            Ok(()) => {
                reservation.commit(entry.current_hash.clone());
                info!(
                    sequence,
                    action = %entry.action,
                    signed = entry.signature.is_some(),
                    "audit entry recorded"
                );
                Ok(Some(entry))
            }
            Err(StoreError::Conflict { sequence: existing }) => {
                reservation.invalidate(format!(
                    "store already holds sequence {}, chain tip is stale",
                    existing
                ));
                warn!(sequence, action = %entry.action, "audit write conflicted, entry skipped");
                Ok(None)
            }
            Err(e) => {
                reservation.abandon();
                warn!(sequence, action = %entry.action, reason = %e, "audit write failed, entry skipped");
                Ok(None)
            }
        }
    }

    /// Record a secondary event without ever failing the caller.
    ///
    /// For events whose loss must not break the code path that raised them,
    /// such as auditing a failure that is already being handled. Errors
    /// become a warning.
    pub fn record_best_effort(&self, data: ActionData) -> Option<u64> {
        let action = data.action.clone();
        match self.record(data) {
            Ok(sequence) => sequence,
            Err(e) => {
                warn!(action = %action, reason = %e, "failed to record audit event");
                None
            }
        }
    }

    pub fn record_system_error(
        &self,
        component: &str,
        message: &str,
        context: Option<Value>,
    ) -> AttestResult<Option<u64>> {
        self.record(events::system_error(component, message, context))
    }

    pub fn record_security_event(
        &self,
        kind: &str,
        severity: Severity,
        details: Value,
    ) -> AttestResult<Option<u64>> {
        self.record(events::security_event(kind, severity, details))
    }

    pub fn record_performance_event(
        &self,
        operation: &str,
        duration: Duration,
        details: Option<Value>,
    ) -> AttestResult<Option<u64>> {
        self.record(events::performance_event(operation, duration, details))
    }

    /// `configuration_change` is critical under the default classifier, so
    /// this fails with `SigningConfiguration` when no secret is available.
    pub fn record_configuration_change(
        &self,
        key: &str,
        old_value: Option<Value>,
        new_value: Value,
        actor_id: Option<&str>,
    ) -> AttestResult<Option<u64>> {
        let mut data = events::configuration_change(key, old_value, new_value);
        data.actor_id = actor_id.map(str::to_string);
        self.record(data)
    }
}

/// A JSON `null` payload would deserialize back as an absent field and stop
/// reproducing its hash, so it is stored as absent from the start.
fn normalize(mut data: ActionData) -> ActionData {
    data.before_state = data.before_state.filter(|v| !v.is_null());
    data.after_state = data.after_state.filter(|v| !v.is_null());
    data
}

impl std::fmt::Debug for AuditLogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogService")
            .field("tip", &self.sequencer.tip().ok())
            .finish_non_exhaustive()
    }
}
