//! Chain hashing.
//!
//! Hash input layout (canonical encoding, see `canonical`):
//!   domain `attest/entry/v1`
//!   sequence, actor_id, action, subject_type, subject_id,
//!   before_state, after_state, source_ip, user_agent, timestamp,
//!   previous_hash
//!
//! `current_hash` and `signature` are never part of the input.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use attest_contracts::{
    entry::{ActionData, AuditEntry},
    error::AttestResult,
};

use crate::canonical::CanonicalEncoder;

const ENTRY_DOMAIN: &str = "attest/entry/v1";

/// Borrowed view of every hashed field of an entry, minus `previous_hash`.
#[derive(Debug, Clone, Copy)]
pub struct EntryFields<'a> {
    pub sequence: u64,
    pub actor_id: Option<&'a str>,
    pub action: &'a str,
    pub subject_type: Option<&'a str>,
    pub subject_id: Option<&'a str>,
    pub before_state: Option<&'a Value>,
    pub after_state: Option<&'a Value>,
    pub source_ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub timestamp: &'a DateTime<Utc>,
}

impl<'a> EntryFields<'a> {
    /// Fields of a candidate entry that has not been built yet.
    pub fn candidate(sequence: u64, data: &'a ActionData, timestamp: &'a DateTime<Utc>) -> Self {
        Self {
            sequence,
            actor_id: data.actor_id.as_deref(),
            action: &data.action,
            subject_type: data.subject_type.as_deref(),
            subject_id: data.subject_id.as_deref(),
            before_state: data.before_state.as_ref(),
            after_state: data.after_state.as_ref(),
            source_ip: data.source_ip.as_deref(),
            user_agent: data.user_agent.as_deref(),
            timestamp,
        }
    }

    /// Fields of an entry as stored.
    pub fn of(entry: &'a AuditEntry) -> Self {
        Self {
            sequence: entry.sequence,
            actor_id: entry.actor_id.as_deref(),
            action: &entry.action,
            subject_type: entry.subject_type.as_deref(),
            subject_id: entry.subject_id.as_deref(),
            before_state: entry.before_state.as_ref(),
            after_state: entry.after_state.as_ref(),
            source_ip: entry.source_ip.as_deref(),
            user_agent: entry.user_agent.as_deref(),
            timestamp: &entry.timestamp,
        }
    }
}

/// Compute the chain hash of one entry.
///
/// Returns a lowercase 64-character hex string. Fails with
/// `AttestError::Serialization` if a payload cannot be canonically encoded.
pub fn compute_hash(fields: &EntryFields<'_>, previous_hash: &str) -> AttestResult<String> {
    let mut enc = CanonicalEncoder::new(ENTRY_DOMAIN);
    enc.u64(fields.sequence)
        .opt_str(fields.actor_id)
        .str(fields.action)
        .opt_str(fields.subject_type)
        .opt_str(fields.subject_id);
    enc.opt_json(fields.before_state)?;
    enc.opt_json(fields.after_state)?;
    enc.opt_str(fields.source_ip)
        .opt_str(fields.user_agent)
        .timestamp(fields.timestamp)
        .str(previous_hash);

    let digest = Sha256::digest(enc.finish());
    Ok(hex::encode(digest))
}

/// Recompute a stored entry's hash from its own fields and stored
/// `previous_hash`.
pub fn recompute(entry: &AuditEntry) -> AttestResult<String> {
    compute_hash(&EntryFields::of(entry), &entry.previous_hash)
}
