//! In-memory implementation of `AuditStore`.
//!
//! `InMemoryAuditStore` keeps entries in a `Vec` behind a `Mutex`. Besides
//! the append-only `AuditStore` surface it exposes two operator hooks that a
//! real deployment would never have, used for outage and tamper drills:
//! `set_offline` and `tamper`/`remove`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::warn;

use attest_contracts::{entry::AuditEntry, error::StoreError};
use attest_core::traits::AuditStore;

/// An append-only audit store held in memory.
#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
    offline: AtomicBool,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every operation fails with
    /// `StoreError::Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every stored entry in sequence order.
    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Modify a stored entry in place, bypassing the append-only contract.
    ///
    /// Returns false if no entry has that sequence.
    pub fn tamper(&self, sequence: u64, edit: impl FnOnce(&mut AuditEntry)) -> bool {
        let Ok(mut entries) = self.lock() else {
            return false;
        };
        match entries.iter_mut().find(|e| e.sequence == sequence) {
            Some(entry) => {
                warn!(sequence, "audit entry modified out of band");
                edit(entry);
                true
            }
            None => false,
        }
    }

    /// Delete a stored entry, bypassing the append-only contract.
    pub fn remove(&self, sequence: u64) -> bool {
        let Ok(mut entries) = self.lock() else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.sequence != sequence);
        let removed = entries.len() != before;
        if removed {
            warn!(sequence, "audit entry deleted out of band");
        }
        removed
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "in-memory store is offline".to_string(),
            });
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<AuditEntry>>, StoreError> {
        self.entries.lock().map_err(|e| StoreError::Unavailable {
            reason: format!("in-memory store lock poisoned: {}", e),
        })
    }
}

impl AuditStore for InMemoryAuditStore {
    fn insert(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.check_online()?;
        let mut entries = self.lock()?;

        if let Some(last) = entries.last() {
            if entry.sequence <= last.sequence {
                return Err(StoreError::Conflict { sequence: last.sequence });
            }
        }

        entries.push(entry.clone());
        Ok(())
    }

    fn latest(&self) -> Result<Option<AuditEntry>, StoreError> {
        self.check_online()?;
        Ok(self.lock()?.last().cloned())
    }

    fn range(&self, start: u64, end: u64) -> Result<Vec<AuditEntry>, StoreError> {
        self.check_online()?;
        Ok(self
            .lock()?
            .iter()
            .filter(|e| e.sequence >= start && e.sequence <= end)
            .cloned()
            .collect())
    }
}
