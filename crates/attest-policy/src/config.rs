//! Service configuration schema.
//!
//! An `AuditConfig` is deserialized from TOML. Every section is optional and
//! falls back to its default.
//!
//! Example:
//! ```toml
//! [store]
//! path = "/var/lib/attest/audit.jsonl"
//!
//! [signing]
//! secret_env = "ATTEST_SIGNING_SECRET"
//!
//! [classifier]
//! critical_actions = ["delete", "permission_change", "approve*"]
//!
//! [sequencer]
//! rebootstrap_interval_secs = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use attest_contracts::error::{AttestError, AttestResult};
use attest_core::sequencer::DEFAULT_REBOOTSTRAP_INTERVAL;

/// Actions signed when no classifier configuration is given.
pub const DEFAULT_CRITICAL_ACTIONS: &[&str] = &[
    "delete",
    "bulk_delete",
    "permission_change",
    "role_change",
    "configuration_change",
    "approve",
    "reject",
];

/// Where the JSON-lines audit store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("audit.jsonl") }
    }
}

/// Where the signing secret comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Environment variable read on every signature.
    pub secret_env: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self { secret_env: "ATTEST_SIGNING_SECRET".to_string() }
    }
}

/// Which actions are critical.
///
/// Entries are exact action names, prefixes ending in `*`, or `*` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub critical_actions: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            critical_actions: DEFAULT_CRITICAL_ACTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Minimum delay between re-bootstrap attempts while degraded.
    pub rebootstrap_interval_secs: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            rebootstrap_interval_secs: DEFAULT_REBOOTSTRAP_INTERVAL.as_secs(),
        }
    }
}

impl SequencerConfig {
    pub fn rebootstrap_interval(&self) -> Duration {
        Duration::from_secs(self.rebootstrap_interval_secs)
    }
}

/// The top-level structure deserialized from an attest TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub store: StoreConfig,
    pub signing: SigningConfig,
    pub classifier: ClassifierConfig,
    pub sequencer: SequencerConfig,
}

impl AuditConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `AttestError::ConfigError` if the TOML is malformed or does
    /// not match the schema.
    pub fn from_toml_str(s: &str) -> AttestResult<Self> {
        toml::from_str(s).map_err(|e| AttestError::ConfigError {
            reason: format!("failed to parse audit config TOML: {}", e),
        })
    }

    /// Read and parse the file at `path`.
    pub fn from_file(path: &Path) -> AttestResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AttestError::ConfigError {
            reason: format!("failed to read audit config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
