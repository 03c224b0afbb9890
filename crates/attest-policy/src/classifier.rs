//! Configurable criticality classifier.
//!
//! `ActionClassifier` implements `CriticalityClassifier` from a list of
//! patterns:
//!
//! - `"delete"`  — exact, case-sensitive match
//! - `"admin_*"` — any action starting with `admin_`
//! - `"*"`       — every action
//!
//! Adding a critical action is a configuration change, never a code change.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use attest_contracts::error::{AttestError, AttestResult};
use attest_core::traits::CriticalityClassifier;

use crate::config::ClassifierConfig;

#[derive(Debug, Clone, Default)]
pub struct ActionClassifier {
    exact: HashSet<String>,
    prefixes: Vec<String>,
    all: bool,
}

impl ActionClassifier {
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classifier = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            match pattern.strip_suffix('*') {
                Some("") => classifier.all = true,
                Some(prefix) => classifier.prefixes.push(prefix.to_string()),
                None => {
                    classifier.exact.insert(pattern.to_string());
                }
            }
        }
        classifier
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::from_patterns(&config.critical_actions)
    }

    /// Parse a standalone `[classifier]`-shaped TOML document:
    ///
    /// ```toml
    /// critical_actions = ["delete", "approve"]
    /// ```
    pub fn from_toml_str(s: &str) -> AttestResult<Self> {
        let config: ClassifierConfig = toml::from_str(s).map_err(|e| AttestError::ConfigError {
            reason: format!("failed to parse classifier TOML: {}", e),
        })?;
        Ok(Self::from_config(&config))
    }

    pub fn from_file(path: &Path) -> AttestResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AttestError::ConfigError {
            reason: format!("failed to read classifier file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}

impl CriticalityClassifier for ActionClassifier {
    fn is_critical(&self, action: &str) -> bool {
        let critical = self.all
            || self.exact.contains(action)
            || self.prefixes.iter().any(|p| action.starts_with(p.as_str()));
        debug!(action = %action, critical, "classified action");
        critical
    }
}
