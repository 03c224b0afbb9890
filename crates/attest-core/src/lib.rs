//! # attest-core
//!
//! The write path of the attest audit chain.
//!
//! This crate provides:
//! - The collaborator traits (`AuditStore`, `SecretProvider`,
//!   `CriticalityClassifier`, `Clock`)
//! - `ChainSequencer`, the reserve/commit critical section over the chain tip
//! - `AuditLogService`, which validates, hashes, signs, persists and commits
//! - Shapers for common audit categories (`events`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use attest_core::AuditLogService;
//! use attest_contracts::ActionData;
//!
//! let service = AuditLogService::new(store, classifier, secrets);
//! service.bootstrap()?;
//! let sequence = service.record(ActionData::new("login").actor("user-42"))?;
//! ```

pub mod events;
pub mod secrets;
pub mod sequencer;
pub mod service;
pub mod traits;

pub use events::Severity;
pub use secrets::{EnvSecretProvider, NoSecret, StaticSecret};
pub use sequencer::{ChainSequencer, ChainTip, Reservation};
pub use service::AuditLogService;
pub use traits::{AuditStore, Clock, CriticalityClassifier, FixedClock, SecretProvider, SystemClock};
