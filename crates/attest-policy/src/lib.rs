//! # attest-policy
//!
//! TOML-driven configuration for the attest audit chain.
//!
//! ## Overview
//!
//! This crate provides [`ActionClassifier`], which implements the
//! [`CriticalityClassifier`](attest_core::traits::CriticalityClassifier)
//! trait, and [`AuditConfig`], the service configuration file.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use attest_policy::{ActionClassifier, AuditConfig};
//!
//! let config = AuditConfig::from_file(Path::new("attest.toml"))?;
//! let classifier = ActionClassifier::from_config(&config.classifier);
//! ```

pub mod classifier;
pub mod config;

pub use classifier::ActionClassifier;
pub use config::{
    AuditConfig, ClassifierConfig, SequencerConfig, SigningConfig, StoreConfig,
    DEFAULT_CRITICAL_ACTIONS,
};

// ── Tests ─────────────────────────────────────────────────────────────────────
