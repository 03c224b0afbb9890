//! Audit entries and the caller-facing input that produces them.
//!
//! `ActionData` is what a caller hands to the service. `AuditEntry` is the
//! immutable row the service persists: the caller's fields plus the sequence,
//! timestamp, chain hashes and optional signature assigned at append time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AttestError, AttestResult};

/// One immutable record in the hash chain.
///
/// Every field except `current_hash` and `signature` feeds the chain hash.
/// Modifying any of them after persistence makes `current_hash`
/// unreproducible, and every later `previous_hash` stops matching the
/// recomputed chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain. The genesis entry is sequence 1.
    pub sequence: u64,

    pub actor_id: Option<String>,

    /// Symbolic action name (`login`, `delete`, ...). Drives classification.
    pub action: String,

    pub subject_type: Option<String>,
    pub subject_id: Option<String>,

    pub before_state: Option<Value>,
    pub after_state: Option<Value>,

    pub source_ip: Option<String>,
    pub user_agent: Option<String>,

    /// Creation time, truncated to microseconds. Hashed exactly as stored.
    pub timestamp: DateTime<Utc>,

    /// `current_hash` of the preceding entry, or `GENESIS_HASH`.
    pub previous_hash: String,

    /// SHA-256 (hex) over the canonical encoding of the fields above.
    pub current_hash: String,

    /// HMAC-SHA256 (hex) over the non-repudiation subset. Present iff the
    /// action was critical when the entry was appended.
    pub signature: Option<String>,
}

impl AuditEntry {
    /// The `previous_hash` of the genesis entry.
    ///
    /// 64 hex zeros: never the SHA-256 of real data, and never confused with
    /// an empty string.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    /// The sequence number assigned to the first entry ever written.
    pub const GENESIS_SEQUENCE: u64 = 1;

    pub fn is_genesis(&self) -> bool {
        self.sequence == Self::GENESIS_SEQUENCE
    }
}

/// Request-scoped context describing who performed an action and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor_id: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn for_actor(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            ..Self::default()
        }
    }

    pub fn with_source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// The caller's description of one auditable action.
///
/// Only `action` is mandatory. Everything else passes through unchanged to
/// the persisted `AuditEntry`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    pub action: String,
    pub actor_id: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ActionData {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn subject(mut self, subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        self.subject_type = Some(subject_type.into());
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn before(mut self, state: Value) -> Self {
        self.before_state = Some(state);
        self
    }

    pub fn after(mut self, state: Value) -> Self {
        self.after_state = Some(state);
        self
    }

    /// Copy actor, IP and user agent from the request context.
    ///
    /// Fields already set on `self` win over the context.
    pub fn with_context(mut self, ctx: &RequestContext) -> Self {
        if self.actor_id.is_none() {
            self.actor_id = ctx.actor_id.clone();
        }
        if self.source_ip.is_none() {
            self.source_ip = ctx.source_ip.clone();
        }
        if self.user_agent.is_none() {
            self.user_agent = ctx.user_agent.clone();
        }
        self
    }

    /// Reject input that cannot become an entry.
    pub fn validate(&self) -> AttestResult<()> {
        if self.action.trim().is_empty() {
            return Err(AttestError::InvalidAction {
                reason: "action must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

/// Convert any serializable value into a JSON payload for `before_state` or
/// `after_state`.
///
/// Fails with `AttestError::Serialization` for values JSON cannot represent,
/// such as maps with non-string keys.
pub fn to_payload<T: Serialize>(value: &T) -> AttestResult<Value> {
    serde_json::to_value(value).map_err(|e| AttestError::Serialization {
        reason: format!("payload is not representable as JSON: {}", e),
    })
}
