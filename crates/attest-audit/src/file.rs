//! Durable JSON-lines implementation of `AuditStore`.
//!
//! One `AuditEntry` per line, appended with `O_APPEND` and flushed with
//! `sync_data` before `insert` returns. The store assumes it is the only
//! writer of its file: the latest entry is cached after the first scan, so
//! appends and `latest` do not re-read the log. `range` always scans.
//!
//! A crash in the middle of an append can leave the last line incomplete.
//! An unterminated final line that does not parse is a torn tail: reads
//! ignore it and the next append truncates it away. A bad line anywhere
//! else is `StoreError::Corrupt`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use attest_contracts::{entry::AuditEntry, error::StoreError};
use attest_core::traits::AuditStore;

/// What a full scan of the file found.
#[derive(Debug, Default)]
struct Scan {
    entries: Vec<AuditEntry>,
    /// Byte offset of an unparseable, unterminated final line.
    torn_at: Option<u64>,
    /// The file ends in a complete entry with no newline after it.
    unterminated: bool,
}

/// Cached end of the log.
#[derive(Debug)]
struct Tail {
    last: Option<AuditEntry>,
    torn_at: Option<u64>,
    unterminated: bool,
}

impl From<Scan> for Tail {
    fn from(scan: Scan) -> Self {
        Self {
            last: scan.entries.into_iter().max_by_key(|e| e.sequence),
            torn_at: scan.torn_at,
            unterminated: scan.unterminated,
        }
    }
}

/// An append-only audit store backed by a `.jsonl` file.
#[derive(Debug)]
pub struct JsonlAuditStore {
    path: PathBuf,
    /// `None` until the file has been scanned successfully.
    tail: Mutex<Option<Tail>>,
}

impl JsonlAuditStore {
    /// Open (creating if needed) the store at `path`.
    ///
    /// A file with corrupt lines still opens, so it can be verified;
    /// `latest` and `insert` report the corruption.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(&path, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| unavailable(&path, e))?;

        let store = Self {
            path,
            tail: Mutex::new(None),
        };
        {
            let mut tail = store.lock_tail()?;
            if let Err(e) = store.load(&mut tail) {
                warn!(path = %store.path.display(), reason = %e, "audit log could not be scanned on open");
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry in file order, without a torn tail.
    pub fn read_all(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.scan()?.entries)
    }

    fn scan(&self) -> Result<Scan, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Scan::default()),
            Err(e) => return Err(unavailable(&self.path, e)),
        };

        let mut scan = Scan::default();
        let mut offset = 0usize;
        for (idx, line) in bytes.split(|b| *b == b'\n').enumerate() {
            let start = offset;
            offset += line.len() + 1;
            let terminated = offset <= bytes.len();

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<AuditEntry>(line) {
                Ok(entry) => {
                    scan.unterminated = !terminated;
                    scan.entries.push(entry);
                }
                Err(e) if !terminated => {
                    warn!(
                        path = %self.path.display(),
                        line = idx + 1,
                        reason = %e,
                        "ignoring torn final line in audit log"
                    );
                    scan.torn_at = Some(start as u64);
                }
                Err(e) => {
                    return Err(StoreError::Corrupt {
                        reason: format!("{} line {}: {}", self.path.display(), idx + 1, e),
                    })
                }
            }
        }
        Ok(scan)
    }

    fn lock_tail(&self) -> Result<MutexGuard<'_, Option<Tail>>, StoreError> {
        self.tail.lock().map_err(|e| StoreError::Unavailable {
            reason: format!("jsonl store lock poisoned: {}", e),
        })
    }

    fn load<'a>(&self, slot: &'a mut Option<Tail>) -> Result<&'a mut Tail, StoreError> {
        if slot.is_none() {
            *slot = Some(Tail::from(self.scan()?));
        }
        slot.as_mut().ok_or_else(|| StoreError::Unavailable {
            reason: "jsonl tail not loaded".to_string(),
        })
    }

    fn append(&self, tail: &mut Tail, entry: &AuditEntry) -> Result<(), StoreError> {
        if let Some(last) = &tail.last {
            if entry.sequence <= last.sequence {
                return Err(StoreError::Conflict { sequence: last.sequence });
            }
        }

        let line = serde_json::to_string(entry).map_err(|e| StoreError::Unavailable {
            reason: format!("failed to encode entry {}: {}", entry.sequence, e),
        })?;

        if let Some(offset) = tail.torn_at {
            let file = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .map_err(|e| unavailable(&self.path, e))?;
            file.set_len(offset).map_err(|e| unavailable(&self.path, e))?;
            warn!(path = %self.path.display(), offset, "truncated torn final line");
            tail.torn_at = None;
        }

        let record = if tail.unterminated {
            format!("\n{}\n", line)
        } else {
            format!("{}\n", line)
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| unavailable(&self.path, e))?;
        file.write_all(record.as_bytes())
            .map_err(|e| unavailable(&self.path, e))?;
        file.sync_data().map_err(|e| unavailable(&self.path, e))?;

        tail.last = Some(entry.clone());
        tail.unterminated = false;
        Ok(())
    }
}

impl AuditStore for JsonlAuditStore {
    fn insert(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut guard = self.lock_tail()?;
        let result = {
            let tail = self.load(&mut guard)?;
            self.append(tail, entry)
        };

        match &result {
            Ok(()) => {
                debug!(sequence = entry.sequence, path = %self.path.display(), "entry appended");
            }
            // A failed write may have left a partial line; rescan next time.
            Err(StoreError::Unavailable { .. }) => *guard = None,
            Err(_) => {}
        }
        result
    }

    fn latest(&self) -> Result<Option<AuditEntry>, StoreError> {
        let mut guard = self.lock_tail()?;
        Ok(self.load(&mut guard)?.last.clone())
    }

    fn range(&self, start: u64, end: u64) -> Result<Vec<AuditEntry>, StoreError> {
        let mut entries: Vec<AuditEntry> = self
            .scan()?
            .entries
            .into_iter()
            .filter(|e| e.sequence >= start && e.sequence <= end)
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }
}

fn unavailable(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Unavailable {
        reason: format!("{}: {}", path.display(), e),
    }
}
