//! The chain sequencer: single source of truth for the chain tip.
//!
//! Appends follow a two-phase protocol:
//!
//!   reserve → (hash, sign, persist) → commit
//!
//! `reserve` takes the sequencer's mutex and hands it to the caller inside a
//! `Reservation`. The lock is held until the reservation is committed or
//! dropped, so no second reservation can ever be issued against a hash that
//! might still roll back. Dropping a reservation without committing leaves
//! the tip untouched; a retry sees the same `previous_hash`.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use attest_contracts::{
    entry::AuditEntry,
    error::{AttestError, AttestResult},
};

use crate::traits::AuditStore;

/// Default minimum delay between re-bootstrap attempts while degraded.
pub const DEFAULT_REBOOTSTRAP_INTERVAL: Duration = Duration::from_secs(5);

/// Observable state of the chain tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainTip {
    /// `bootstrap` has not run yet. Appends are refused.
    Unbootstrapped,

    /// The tip reflects the latest durably persisted entry.
    Ready { last_sequence: u64, last_hash: String },

    /// The store could not be read. Appends are skipped until a
    /// re-bootstrap succeeds.
    Degraded { reason: String },
}

impl ChainTip {
    /// Tip of a chain with no entries.
    pub fn genesis() -> Self {
        ChainTip::Ready {
            last_sequence: 0,
            last_hash: AuditEntry::GENESIS_HASH.to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ChainTip::Ready { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ChainTip::Degraded { .. })
    }
}

struct SequencerState {
    tip: ChainTip,
    last_bootstrap_attempt: Option<Instant>,
}

impl SequencerState {
    fn load_from(&mut self, store: &dyn AuditStore) {
        self.last_bootstrap_attempt = Some(Instant::now());
        self.tip = match store.latest() {
            Ok(Some(entry)) => ChainTip::Ready {
                last_sequence: entry.sequence,
                last_hash: entry.current_hash,
            },
            Ok(None) => ChainTip::genesis(),
            Err(e) => ChainTip::Degraded { reason: e.to_string() },
        };
    }
}

/// Serializes appends and tracks the chain tip.
pub struct ChainSequencer {
    state: Mutex<SequencerState>,
    rebootstrap_interval: Duration,
}

impl Default for ChainSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainSequencer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SequencerState {
                tip: ChainTip::Unbootstrapped,
                last_bootstrap_attempt: None,
            }),
            rebootstrap_interval: DEFAULT_REBOOTSTRAP_INTERVAL,
        }
    }

    /// Minimum delay between re-bootstrap attempts while degraded.
    pub fn with_rebootstrap_interval(mut self, interval: Duration) -> Self {
        self.rebootstrap_interval = interval;
        self
    }

    /// Initialize the tip from the most recent persisted entry.
    ///
    /// An empty store yields the genesis tip. An unreachable store yields
    /// `ChainTip::Degraded` instead of an error, so startup is never blocked
    /// by an audit outage. Calling this again without new writes in between
    /// produces the same tip.
    pub fn bootstrap(&self, store: &dyn AuditStore) -> AttestResult<ChainTip> {
        let mut state = self.lock()?;
        state.load_from(store);

        match &state.tip {
            ChainTip::Ready { last_sequence, last_hash } => {
                info!(last_sequence, last_hash = %last_hash, "audit chain bootstrapped");
            }
            ChainTip::Degraded { reason } => {
                warn!(reason = %reason, "audit store unreachable, chain entering degraded mode");
            }
            ChainTip::Unbootstrapped => {}
        }

        Ok(state.tip.clone())
    }

    /// A snapshot of the current tip.
    pub fn tip(&self) -> AttestResult<ChainTip> {
        Ok(self.lock()?.tip.clone())
    }

    /// Reserve the next chain position.
    ///
    /// Blocks while another reservation is outstanding. While degraded, a
    /// re-bootstrap from `store` is attempted first if the re-bootstrap
    /// interval has elapsed.
    ///
    /// # Errors
    ///
    /// - `NotBootstrapped` before the first `bootstrap`
    /// - `PersistenceUnavailable` while degraded
    /// - `StatePoisoned` if a previous holder panicked
    pub fn reserve(&self, store: &dyn AuditStore) -> AttestResult<Reservation<'_>> {
        let mut state = self.lock()?;

        if state.tip.is_degraded() {
            let due = state
                .last_bootstrap_attempt
                .map_or(true, |at| at.elapsed() >= self.rebootstrap_interval);
            if due {
                debug!("attempting re-bootstrap of degraded audit chain");
                state.load_from(store);
                if let ChainTip::Ready { last_sequence, .. } = &state.tip {
                    info!(last_sequence = *last_sequence, "audit store recovered, chain resumed");
                }
            }
        }

        let (sequence, previous_hash) = match &state.tip {
            ChainTip::Unbootstrapped => return Err(AttestError::NotBootstrapped),
            ChainTip::Degraded { reason } => {
                return Err(AttestError::PersistenceUnavailable {
                    reason: reason.clone(),
                })
            }
            ChainTip::Ready { last_sequence, last_hash } => (last_sequence + 1, last_hash.clone()),
        };

        debug!(sequence, previous_hash = %previous_hash, "chain position reserved");

        Ok(Reservation {
            state,
            sequence,
            previous_hash,
            settled: false,
        })
    }

    fn lock(&self) -> AttestResult<MutexGuard<'_, SequencerState>> {
        self.state.lock().map_err(|e| {
            error!("audit sequencer lock poisoned");
            AttestError::StatePoisoned {
                reason: format!("sequencer lock poisoned: {}", e),
            }
        })
    }
}

/// An exclusive claim on the next chain position.
///
/// Holds the sequencer lock. Commit after the entry is durably persisted;
/// drop (or `abandon`) to roll back.
pub struct Reservation<'a> {
    state: MutexGuard<'a, SequencerState>,
    sequence: u64,
    previous_hash: String,
    settled: bool,
}

impl Reservation<'_> {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    /// Advance the tip to the entry that was just persisted.
    pub fn commit(mut self, current_hash: String) {
        self.state.tip = ChainTip::Ready {
            last_sequence: self.sequence,
            last_hash: current_hash,
        };
        self.settled = true;
    }

    /// Release the reservation without advancing the tip.
    pub fn abandon(mut self) {
        debug!(sequence = self.sequence, "reservation rolled back");
        self.settled = true;
    }

    /// Mark the tip as stale. The next reservation re-reads it from the store
    /// immediately, ignoring the re-bootstrap interval.
    pub fn invalidate(mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(sequence = self.sequence, reason = %reason, "chain tip invalidated");
        self.state.tip = ChainTip::Degraded { reason };
        self.state.last_bootstrap_attempt = None;
        self.settled = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(sequence = self.sequence, "reservation dropped without commit, rolled back");
        }
    }
}
