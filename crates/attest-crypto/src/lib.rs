//! # attest-crypto
//!
//! Pure, stateless primitives behind the attest audit chain:
//!
//! - `canonical` — the explicit byte encoding every hash and signature
//!   is computed over
//! - `hash` — SHA-256 chain hashing (`compute_hash`, `recompute`)
//! - `sign` — HMAC-SHA256 signing of the non-repudiation subset
//!
//! Nothing here performs I/O or holds state.

pub mod canonical;
pub mod hash;
pub mod sign;

pub use canonical::{canonical_json, canonical_timestamp};
pub use hash::{compute_hash, recompute, EntryFields};
pub use sign::{sign, verify_signature, SignedFields, SigningSecret};
